//! `pkg-move`/`slotmove` applier (§4.7).
//!
//! Reads a directory of `[1-4]Q-YYYY` update files and produces, per
//! `cat/pkg` key, an ordered command chain a caller can replay against a
//! stored atom to bring it up to date. Grounded on the transitive
//! deque-splicing algorithm in the original implementation: a `move`
//! redirects every chain currently ending at its source key onward to its
//! target, so a later `B -> C` automatically extends chains that earlier
//! moved `A -> B`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::cpv::Cpn;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Move { old_key: String, new_key: String },
    SlotMove { key: String, old_slot: String, new_slot: String },
}

pub fn read_updates(dir: &Path) -> Result<HashMap<String, Vec<Command>>> {
    let mut files = scan_directory(dir)?;
    files.sort_by_key(|(year, quarter, _)| (year.clone(), quarter.clone()));

    let mut commands: HashMap<String, Vec<Command>> = HashMap::new();
    let mut keys_at: HashMap<String, Vec<String>> = HashMap::new();
    let mut moved: HashMap<String, String> = HashMap::new();

    for (_, _, name) in &files {
        let path = dir.join(name);
        let contents = fs::read_to_string(&path).map_err(|source| Error::Io { path: path.clone(), source })?;
        for (lineno, raw_line) in contents.lines().enumerate() {
            let line: Vec<&str> = raw_line.split_whitespace().collect();
            if line.is_empty() {
                continue;
            }
            process_line(&line, name, lineno + 1, &mut commands, &mut keys_at, &mut moved);
        }
    }

    commands.retain(|_, v| !v.is_empty());
    Ok(commands)
}

fn process_line(
    line: &[&str],
    filename: &str,
    lineno: usize,
    commands: &mut HashMap<String, Vec<Command>>,
    keys_at: &mut HashMap<String, Vec<String>>,
    moved: &mut HashMap<String, String>,
) {
    match line[0] {
        "move" if line.len() == 3 => {
            let Ok(src) = Cpn::parse(line[1]) else {
                tracing::error!(filename, lineno, "bad move source atom");
                return;
            };
            let Ok(trg) = Cpn::parse(line[2]) else {
                tracing::error!(filename, lineno, "bad move target atom");
                return;
            };
            let src_key = src.to_string();
            let trg_key = trg.to_string();

            if let Some(existing) = moved.get(&src_key) {
                tracing::warn!(filename, lineno, src = %src_key, moved_to = %existing, "redundant move, already moved");
                return;
            }

            let originals = keys_at
                .remove(&src_key)
                .unwrap_or_else(|| vec![src_key.clone()]);
            for orig in &originals {
                commands.entry(orig.clone()).or_default().push(Command::Move {
                    old_key: src_key.clone(),
                    new_key: trg_key.clone(),
                });
            }
            keys_at.entry(trg_key.clone()).or_default().extend(originals);
            moved.insert(src_key, trg_key);
        }
        "move" => tracing::error!(filename, lineno, "bad move form"),
        "slotmove" if line.len() == 4 => {
            let Ok(src) = Cpn::parse(line[1]) else {
                tracing::error!(filename, lineno, "bad slotmove atom");
                return;
            };
            let key = src.to_string();
            if let Some(existing) = moved.get(&key) {
                tracing::warn!(filename, lineno, src = %key, moved_to = %existing, "redundant slotmove, key already moved");
                return;
            }
            let originals = keys_at.get(&key).cloned().unwrap_or_else(|| vec![key.clone()]);
            for orig in &originals {
                commands.entry(orig.clone()).or_default().push(Command::SlotMove {
                    key: key.clone(),
                    old_slot: line[2].to_string(),
                    new_slot: line[3].to_string(),
                });
            }
        }
        "slotmove" => tracing::error!(filename, lineno, "bad slotmove form"),
        other => tracing::error!(filename, lineno, directive = other, "unknown update directive"),
    }
}

fn scan_directory(dir: &Path) -> Result<Vec<(String, String, String)>> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(Error::Io { path: dir.to_path_buf(), source }),
    };
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| Error::Io { path: dir.to_path_buf(), source })?;
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some((quarter, year)) = parse_update_filename(&name) {
            out.push((year, quarter, name));
        }
    }
    Ok(out)
}

fn parse_update_filename(name: &str) -> Option<(String, String)> {
    let (quarter, rest) = name.split_once('Q')?;
    let (dash, year) = rest.split_at(1);
    if dash != "-" || quarter.len() != 1 || !quarter.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let q: u32 = quarter.parse().ok()?;
    if !(1..=4).contains(&q) {
        return None;
    }
    if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((quarter.to_string(), year.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn tempdir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("portage-resolver-updates-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write(dir: &Path, name: &str, contents: &str) {
        let mut f = fs::File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn filename_pattern_rejects_malformed() {
        assert!(parse_update_filename("1Q-2020").is_some());
        assert!(parse_update_filename("5Q-2020").is_none());
        assert!(parse_update_filename("1Q-20").is_none());
        assert!(parse_update_filename("random").is_none());
    }

    #[test]
    fn chained_moves_are_transitive() {
        let dir = tempdir("chain");
        write(&dir, "1Q-2020", "move cat/a cat/b\n");
        write(&dir, "2Q-2020", "move cat/b cat/c\n");
        let commands = read_updates(&dir).unwrap();
        let chain = commands.get("cat/a").unwrap();
        assert_eq!(
            chain,
            &vec![
                Command::Move { old_key: "cat/a".into(), new_key: "cat/b".into() },
                Command::Move { old_key: "cat/b".into(), new_key: "cat/c".into() },
            ]
        );
    }

    #[test]
    fn redundant_move_is_dropped() {
        let dir = tempdir("redundant");
        write(&dir, "1Q-2020", "move cat/a cat/b\nmove cat/a cat/c\n");
        let commands = read_updates(&dir).unwrap();
        assert_eq!(commands.get("cat/a").unwrap().len(), 1);
    }

    #[test]
    fn slotmove_appends_to_chain() {
        let dir = tempdir("slotmove");
        write(&dir, "1Q-2020", "move cat/a cat/b\nslotmove cat/b 0 1\n");
        let commands = read_updates(&dir).unwrap();
        let chain = commands.get("cat/a").unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(
            chain[1],
            Command::SlotMove { key: "cat/b".into(), old_slot: "0".into(), new_slot: "1".into() }
        );
    }
}
