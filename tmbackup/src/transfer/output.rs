//! Interpreting rsync output.

/// Log signatures of a full backup device.
const DEVICE_FULL_SIGNATURES: [&str; 2] = ["No space left on device (28)", "Result too large (34)"];

/// Did the transfer stop because the destination ran out of space?
///
/// rsync has no dedicated exit status for this, so the log text is scanned.
pub fn is_device_full(log: &str) -> bool {
    DEVICE_FULL_SIGNATURES
        .iter()
        .any(|signature| log.contains(signature))
}

/// Lines of a backup transfer not worth showing to the operator:
/// blanks, deletions and entries whose only change is the timestamp.
pub fn is_noise(line: &str) -> bool {
    let line = line.trim_end();
    line.trim().is_empty()
        || line.starts_with("*deleting")
        || line.starts_with("deleting ")
        || is_timestamp_only(line)
}

/// `.d..t...... some/dir/`: nothing but the modification time changed.
fn is_timestamp_only(line: &str) -> bool {
    let bytes = line.as_bytes();
    if bytes.len() < 12 || bytes[0] != b'.' || bytes[11] != b' ' {
        return false;
    }
    if !matches!(bytes[1], b'f' | b'd' | b'L' | b'D' | b'S') {
        return false;
    }
    bytes[2..11].iter().enumerate().all(|(i, b)| match i {
        2 => matches!(b, b't' | b'T'),
        _ => *b == b'.',
    })
}

/// Lines of a dry-run comparison that are rsync's own chatter.
pub fn is_diff_noise(line: &str) -> bool {
    let line = line.trim();
    line.is_empty()
        || line.starts_with("sending ")
        || line.starts_with("receiving ")
        || (line.starts_with("sent ") && line.ends_with("sec"))
        || line.starts_with("total size is")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_full_detection() {
        assert!(is_device_full(
            "2024/05/10 15:00:01 [123] rsync: write failed on \"/b/x\": No space left on device (28)\n"
        ));
        assert!(is_device_full("rsync: [receiver] write error: Result too large (34)"));
        assert!(!is_device_full("rsync error: some files could not be transferred (code 23)"));
        assert!(!is_device_full(""));
    }

    #[test]
    fn test_noise_lines() {
        assert!(is_noise(""));
        assert!(is_noise("   "));
        assert!(is_noise("*deleting   old/file.txt"));
        assert!(is_noise("deleting old/file.txt"));
        assert!(is_noise(".d..t...... photos/"));
        assert!(is_noise(".f..T...... notes.txt"));
    }

    #[test]
    fn test_meaningful_lines() {
        assert!(!is_noise(">f+++++++++ new.txt"));
        assert!(!is_noise(">f.st...... changed.txt"));
        assert!(!is_noise(".f...p..... mode-only.txt"));
        assert!(!is_noise(".d..t.o.... owner-and-time/"));
        assert!(!is_noise("cd+++++++++ new-dir/"));
        assert!(!is_noise("hf+++++++++ link => target"));
    }

    #[test]
    fn test_diff_noise() {
        assert!(is_diff_noise("sending incremental file list"));
        assert!(is_diff_noise(""));
        assert!(is_diff_noise("sent 1,234 bytes  received 56 bytes  2,580.00 bytes/sec"));
        assert!(is_diff_noise("total size is 9,876  speedup is 7.65 (DRY RUN)"));
        assert!(!is_diff_noise(">f.st...... report.pdf"));
        assert!(!is_diff_noise("*deleting   gone.txt"));
    }
}
