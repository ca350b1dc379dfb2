//! Parses one protocol line into a command and dispatches it against a
//! shared [`myfs_core::fs::Filesystem`], rendering the exact `Yes`/`No
//! <reason>` (or command-specific) wire response.

use myfs_block::BlockDevice;
use myfs_core::{
    error::Error,
    fs::{Filesystem, Session},
};

use crate::datefmt::format_mtime;

/// What the dispatcher wants the connection loop to do after one line.
pub enum Outcome {
    /// Send this text (newline already appended) and keep the connection open.
    Reply(String),
    /// Stream this raw body (for `cat`), then keep the connection open.
    Body(Vec<u8>),
    /// Send this text, then close the connection (`e`).
    Close(String),
}

fn no(reason: &str) -> Outcome {
    Outcome::Reply(format!("No {reason}\n"))
}

fn yes() -> Outcome {
    Outcome::Reply("Yes\n".to_string())
}

/// Turns a command result into the wire outcome, except `Error::Device`:
/// a disk-side failure is fatal to the session, so it is propagated with
/// `?` instead, letting the connection loop tear the session down rather
/// than send a `No` as if it were a normal failure.
fn render(result: myfs_core::Result<()>) -> myfs_core::Result<Outcome> {
    match result {
        Ok(()) => Ok(yes()),
        Err(Error::Device(e)) => Err(Error::Device(e)),
        Err(other) => Ok(no(&other.to_string())),
    }
}

/// Splits a line into `max` whitespace-delimited tokens followed by the
/// untokenized remainder of the line, matching the original service's
/// "extra args collapse into one trailing payload" parsing so a `w`/`i`
/// data argument may itself contain spaces.
fn split_with_tail(args: &str, max: usize) -> Vec<&str> {
    let mut out = Vec::with_capacity(max + 1);
    let mut rest = args.trim_start();
    for _ in 0..max {
        if rest.is_empty() {
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(idx) => {
                out.push(&rest[..idx]);
                rest = rest[idx..].trim_start();
            }
            None => {
                out.push(rest);
                rest = "";
                break;
            }
        }
    }
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

fn parse_u32(s: &str) -> Option<u32> {
    s.parse().ok()
}

fn parse_mode(s: Option<&&str>) -> Option<u8> {
    s.and_then(|s| u8::from_str_radix(s, 2).ok().or_else(|| s.parse().ok()))
        .map(|m| m & 0b1111)
}

/// Handles one already-trimmed, non-empty protocol line.
pub fn dispatch<D: BlockDevice>(
    fs: &mut Filesystem<D>,
    session: &mut Session,
    line: &str,
    ninodes: u32,
) -> myfs_core::Result<Outcome> {
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((c, r)) => (c, r.trim_start()),
        None => (line, ""),
    };

    if cmd == "login" {
        let args = split_with_tail(rest, 1);
        let Some(uid) = args.first().and_then(|s| s.parse::<u16>().ok()) else {
            return Ok(no("Usage: login <uid>"));
        };
        return Ok(match Filesystem::<D>::login(session, uid) {
            Ok(()) => Outcome::Reply(format!("Hello, uid={uid}!\n")),
            Err(Error::Device(e)) => return Err(Error::Device(e)),
            Err(other) => no(&other.to_string()),
        });
    }
    if cmd == "e" {
        return Ok(Outcome::Close("Goodbye!\n".to_string()));
    }

    if !session.is_logged_in() {
        return Ok(Outcome::Reply(
            "Please enter your UID: login <uid>\n".to_string(),
        ));
    }
    if cmd != "f" && !fs.is_formatted() {
        return Ok(no("Not formatted"));
    }

    let outcome = match cmd {
        "f" => match fs.format(ninodes, session) {
            Ok(()) => Outcome::Reply("Done\n".to_string()),
            Err(Error::Device(e)) => return Err(Error::Device(e)),
            Err(other) => no(&other.to_string()),
        },
        "mk" | "mkdir" => {
            let args = split_with_tail(rest, 2);
            let Some(&name) = args.first() else {
                return Ok(no(&format!("Usage: {cmd} <name> [mode]")));
            };
            let mode = parse_mode(args.get(1));
            let result = if cmd == "mk" {
                fs.mk(session, name, mode)
            } else {
                fs.mkdir(session, name, mode)
            };
            render(result)?
        }
        "rm" => {
            let args = split_with_tail(rest, 1);
            let Some(&name) = args.first() else {
                return Ok(no("Usage: rm <name>"));
            };
            render(fs.rm(session, name))?
        }
        "rmdir" => {
            let args = split_with_tail(rest, 1);
            let Some(&name) = args.first() else {
                return Ok(no("Usage: rmdir <name>"));
            };
            render(fs.rmdir(session, name))?
        }
        "cd" => {
            let args = split_with_tail(rest, 1);
            let Some(&path) = args.first() else {
                return Ok(no("Usage: cd <path>"));
            };
            render(fs.cd(session, path))?
        }
        "ls" => match fs.ls(session) {
            Ok(rows) => {
                let mut out = String::from("Type\tOwner\tUpdate time\tSize\tName\n");
                for row in rows {
                    let typechar = if row.is_dir { 'd' } else { '-' };
                    let owner_r = if row.mode & 0b1000 != 0 { 'r' } else { '-' };
                    let owner_w = if row.mode & 0b0100 != 0 { 'w' } else { '-' };
                    let other_r = if row.mode & 0b0010 != 0 { 'r' } else { '-' };
                    let other_w = if row.mode & 0b0001 != 0 { 'w' } else { '-' };
                    out.push_str(&format!(
                        "{typechar}{owner_r}{owner_w}{other_r}{other_w}\t{}\t{}\t{}\t{}\n",
                        row.uid,
                        format_mtime(row.mtime),
                        row.size,
                        row.name
                    ));
                }
                Outcome::Reply(out)
            }
            Err(Error::Device(e)) => return Err(Error::Device(e)),
            Err(other) => no(&other.to_string()),
        },
        "cat" => {
            let args = split_with_tail(rest, 1);
            let Some(&name) = args.first() else {
                return Ok(no("Usage: cat <name>"));
            };
            match fs.cat(session, name) {
                Ok(mut body) => {
                    body.push(b'\n');
                    Outcome::Body(body)
                }
                Err(Error::Device(e)) => return Err(Error::Device(e)),
                Err(other) => no(&other.to_string()),
            }
        }
        "w" => {
            let args = split_with_tail(rest, 2);
            let (Some(&name), Some(len)) = (args.first(), args.get(1).and_then(|s| parse_u32(s)))
            else {
                return Ok(no("Usage: w <name> <len> <data>"));
            };
            let data = args.get(2).copied().unwrap_or("").as_bytes();
            if len as usize > 512 || (len as usize) > data.len() {
                return Ok(no("Usage: w <name> <len> <data>"));
            }
            render(fs.write(session, name, len, data))?
        }
        "i" => {
            let args = split_with_tail(rest, 3);
            let (Some(&name), Some(pos), Some(len)) = (
                args.first(),
                args.get(1).and_then(|s| parse_u32(s)),
                args.get(2).and_then(|s| parse_u32(s)),
            ) else {
                return Ok(no("Usage: i <name> <pos> <len> <data>"));
            };
            let data = args.get(3).copied().unwrap_or("").as_bytes();
            if (len as usize) > data.len() {
                return Ok(no("Usage: i <name> <pos> <len> <data>"));
            }
            render(fs.insert(session, name, pos, len, data))?
        }
        "d" => {
            let args = split_with_tail(rest, 3);
            let (Some(&name), Some(pos), Some(len)) = (
                args.first(),
                args.get(1).and_then(|s| parse_u32(s)),
                args.get(2).and_then(|s| parse_u32(s)),
            ) else {
                return Ok(no("Usage: d <name> <pos> <len>"));
            };
            render(fs.delete_range(session, name, pos, len))?
        }
        _ => no("No such command"),
    };
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use myfs_block::MemBlockDevice;

    fn fs() -> Filesystem<MemBlockDevice> {
        Filesystem::open(MemBlockDevice::new(8, 128)).unwrap()
    }

    #[test]
    fn login_then_format_then_ls() {
        let mut fs = fs();
        let mut session = Session::new();
        match dispatch(&mut fs, &mut session, "login 1", 1024).unwrap() {
            Outcome::Reply(s) => assert_eq!(s, "Hello, uid=1!\n"),
            _ => panic!("expected reply"),
        }
        match dispatch(&mut fs, &mut session, "f", 1024).unwrap() {
            Outcome::Reply(s) => assert_eq!(s, "Done\n"),
            _ => panic!("expected reply"),
        }
        match dispatch(&mut fs, &mut session, "ls", 1024).unwrap() {
            Outcome::Reply(s) => assert_eq!(s, "Type\tOwner\tUpdate time\tSize\tName\n"),
            _ => panic!("expected reply"),
        }
    }

    #[test]
    fn commands_before_login_prompt_for_uid() {
        let mut fs = fs();
        let mut session = Session::new();
        match dispatch(&mut fs, &mut session, "ls", 1024).unwrap() {
            Outcome::Reply(s) => assert_eq!(s, "Please enter your UID: login <uid>\n"),
            _ => panic!("expected reply"),
        }
    }

    #[test]
    fn mk_write_cat_roundtrip() {
        let mut fs = fs();
        let mut session = Session::new();
        dispatch(&mut fs, &mut session, "login 1", 1024).unwrap();
        dispatch(&mut fs, &mut session, "f", 1024).unwrap();
        dispatch(&mut fs, &mut session, "mk hello", 1024).unwrap();
        match dispatch(&mut fs, &mut session, "w hello 5 world", 1024).unwrap() {
            Outcome::Reply(s) => assert_eq!(s, "Yes\n"),
            _ => panic!("expected reply"),
        }
        match dispatch(&mut fs, &mut session, "cat hello", 1024).unwrap() {
            Outcome::Body(b) => assert_eq!(b, b"world\n"),
            _ => panic!("expected body"),
        }
    }

    #[test]
    fn data_arg_may_contain_spaces() {
        let mut fs = fs();
        let mut session = Session::new();
        dispatch(&mut fs, &mut session, "login 1", 1024).unwrap();
        dispatch(&mut fs, &mut session, "f", 1024).unwrap();
        dispatch(&mut fs, &mut session, "mk hello", 1024).unwrap();
        dispatch(&mut fs, &mut session, "w hello 11 hello world", 1024).unwrap();
        match dispatch(&mut fs, &mut session, "cat hello", 1024).unwrap() {
            Outcome::Body(b) => assert_eq!(b, b"hello world\n"),
            _ => panic!("expected body"),
        }
    }

    #[test]
    fn e_closes_the_session() {
        let mut fs = fs();
        let mut session = Session::new();
        match dispatch(&mut fs, &mut session, "e", 1024).unwrap() {
            Outcome::Close(s) => assert_eq!(s, "Goodbye!\n"),
            _ => panic!("expected close"),
        }
    }

    #[test]
    fn unrecognized_command_is_no() {
        let mut fs = fs();
        let mut session = Session::new();
        dispatch(&mut fs, &mut session, "login 1", 1024).unwrap();
        dispatch(&mut fs, &mut session, "f", 1024).unwrap();
        match dispatch(&mut fs, &mut session, "blargh", 1024).unwrap() {
            Outcome::Reply(s) => assert!(s.starts_with("No")),
            _ => panic!("expected reply"),
        }
    }
}
