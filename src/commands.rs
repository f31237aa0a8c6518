//! Shell command implementations
use core::fmt::Write as _;
use storage::{BlockDevice, Session};

/// A shell command result
pub type CommandResult = Result<(), String>;

/// Execute a command with its arguments against `session`, appending any
/// output to `out`.
///
/// # Errors
///
/// Returns `Err(String)` if the command was not recognized, was given the
/// wrong number of arguments, or failed on the volume.
pub fn execute_command<D: BlockDevice>(
    session: &mut Session<D>,
    command: &str,
    args: &[String],
    out: &mut String,
) -> CommandResult {
    match command {
        "" => Ok(()),
        "help" => {
            cmd_help(out);
            Ok(())
        }
        "info" => cmd_info(session, args, out),
        "ls" => cmd_ls(session, args, out),
        "cd" => {
            let [name] = expect_args::<1>(command, args, "<name>")?;
            session.cd(name).map_err(|e| e.to_string())
        }
        "mkdir" => {
            let [name] = expect_args::<1>(command, args, "<name>")?;
            session.mkdir(name).map_err(|e| e.to_string())
        }
        "creat" => {
            let [name] = expect_args::<1>(command, args, "<name>")?;
            session.creat(name).map_err(|e| e.to_string())
        }
        "open" => cmd_open(session, args, out),
        "close" => {
            let [name] = expect_args::<1>(command, args, "<name>")?;
            session.close(name).map_err(|e| e.to_string())
        }
        "lsof" => cmd_lsof(session, args, out),
        "lseek" => cmd_lseek(session, args, out),
        "read" => cmd_read(session, args, out),
        "write" => cmd_write(session, args, out),
        "mv" => {
            let [src, dest] = expect_args::<2>(command, args, "<src> <dest>")?;
            session.mv(src, dest).map_err(|e| e.to_string())
        }
        "rm" => {
            let [name] = expect_args::<1>(command, args, "<name>")?;
            session.rm(name).map_err(|e| e.to_string())
        }
        "rmdir" => {
            let [name] = expect_args::<1>(command, args, "<name>")?;
            session.rmdir(name).map_err(|e| e.to_string())
        }
        _ => Err(format!("Unknown command: {command}")),
    }
}

/// Parse a command line into a command and arguments
pub fn parse_command_line(line: &str) -> (String, Vec<String>) {
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or("").to_string();
    let args = parts.map(ToString::to_string).collect();
    (command, args)
}

/// Checks that exactly `N` arguments were given.
fn expect_args<'a, const N: usize>(
    command: &str,
    args: &'a [String],
    usage: &str,
) -> Result<[&'a str; N], String> {
    if args.len() != N {
        return Err(format!("Usage: {command} {usage}").trim_end().to_string());
    }
    Ok(core::array::from_fn(|i| args[i].as_str()))
}

/// Display help text
fn cmd_help(out: &mut String) {
    out.push_str(
        "fatvol - Available commands:\n  \
            info                  - Show boot sector fields and cluster usage\n  \
            ls                    - List the current directory\n  \
            cd <name>             - Change directory\n  \
            mkdir <name>          - Create a directory\n  \
            creat <name>          - Create an empty file\n  \
            open <name> <flag>    - Open a file (-r, -w, -rw, -wr)\n  \
            close <name>          - Close an open file\n  \
            lsof                  - List open files\n  \
            lseek <name> <offset> - Set the offset of an open file\n  \
            read <name> <size>    - Read bytes from an open file\n  \
            write <name> <text>   - Write text to an open file\n  \
            mv <src> <dest>       - Rename, or move into a directory\n  \
            rm <name>             - Delete a file\n  \
            rmdir <name>          - Delete an empty directory\n  \
            help                  - Display this help text\n  \
            exit                  - Leave the shell\n\
        ",
    );
}

fn cmd_info<D: BlockDevice>(
    session: &mut Session<D>,
    args: &[String],
    out: &mut String,
) -> CommandResult {
    let [] = expect_args::<0>("info", args, "")?;
    let info = session.info().map_err(|e| e.to_string())?;
    let bpb = info.bpb;

    let fields = [
        ("BytesPerSec:", u64::from(bpb.bytes_per_sector())),
        ("SecPerClus:", u64::from(bpb.sectors_per_cluster())),
        ("RsvdSecCnt:", u64::from(bpb.reserved_sectors())),
        ("NumFATs:", u64::from(bpb.fat_count())),
        ("TotalSec32:", u64::from(bpb.total_sectors())),
        ("FATSz32:", u64::from(bpb.sectors_per_fat())),
        ("RootClus:", u64::from(bpb.root_cluster())),
        ("Clusters:", u64::from(info.total_clusters)),
        ("FreeClus:", u64::from(info.free_clusters)),
    ];
    for (label, value) in fields {
        let _ = writeln!(out, "{label:<12} {value}");
    }
    Ok(())
}

fn cmd_ls<D: BlockDevice>(
    session: &mut Session<D>,
    args: &[String],
    out: &mut String,
) -> CommandResult {
    let [] = expect_args::<0>("ls", args, "")?;
    for slot in session.ls().map_err(|e| e.to_string())? {
        let entry = slot.entry;
        if entry.is_directory() {
            let _ = writeln!(out, "{}/", entry.name());
        } else {
            let _ = writeln!(out, "{:<12} {}", entry.name(), entry.file_size());
        }
    }
    Ok(())
}

fn cmd_open<D: BlockDevice>(
    session: &mut Session<D>,
    args: &[String],
    out: &mut String,
) -> CommandResult {
    let [name, flag] = expect_args::<2>("open", args, "<name> <flag>")?;
    let index = session.open(name, flag).map_err(|e| e.to_string())?;
    let _ = writeln!(out, "Opened {} at slot {index}", name.to_ascii_uppercase());
    Ok(())
}

fn cmd_lsof<D: BlockDevice>(
    session: &mut Session<D>,
    args: &[String],
    out: &mut String,
) -> CommandResult {
    let [] = expect_args::<0>("lsof", args, "")?;
    if session.open_files().is_empty() {
        out.push_str("No open files\n");
        return Ok(());
    }
    let _ = writeln!(
        out,
        "{:<5} {:<12} {:<5} {:<8} PATH",
        "SLOT", "NAME", "MODE", "OFFSET"
    );
    for (index, file) in session.lsof() {
        let _ = writeln!(
            out,
            "{index:<5} {:<12} {:<5} {:<8} {}",
            file.name(),
            file.mode(),
            file.offset(),
            file.path()
        );
    }
    Ok(())
}

fn cmd_lseek<D: BlockDevice>(
    session: &mut Session<D>,
    args: &[String],
    out: &mut String,
) -> CommandResult {
    let [name, offset] = expect_args::<2>("lseek", args, "<name> <offset>")?;
    let offset = offset
        .parse::<i64>()
        .map_err(|_| "Invalid offset".to_string())?;
    let position = session.lseek(name, offset).map_err(|e| e.to_string())?;
    let _ = writeln!(out, "Offset is now {position}");
    Ok(())
}

fn cmd_read<D: BlockDevice>(
    session: &mut Session<D>,
    args: &[String],
    out: &mut String,
) -> CommandResult {
    let [name, size] = expect_args::<2>("read", args, "<name> <size>")?;
    let size = size
        .parse::<usize>()
        .map_err(|_| "Invalid size".to_string())?;
    let data = session.read(name, size).map_err(|e| e.to_string())?;
    out.push_str(&String::from_utf8_lossy(&data));
    out.push('\n');
    Ok(())
}

fn cmd_write<D: BlockDevice>(
    session: &mut Session<D>,
    args: &[String],
    out: &mut String,
) -> CommandResult {
    let Some((name, text)) = args.split_first().filter(|(_, text)| !text.is_empty()) else {
        return Err("Usage: write <name> <text>".to_string());
    };
    let joined = text.join(" ");
    let text = joined
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(&joined);
    let written = session
        .write(name, text.as_bytes())
        .map_err(|e| e.to_string())?;
    let _ = writeln!(out, "Wrote {written} bytes");
    Ok(())
}
