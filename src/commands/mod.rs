//! Flipper CLI command vocabulary.
//!
//! Firmware builds differ in which storage syntax they accept, so each
//! storage operation is described as an ordered list of candidate commands
//! that the serial session tries until one produces a usable response.

/// Response returned when a command produced no output.
pub const COMMAND_SENT: &str = "Command sent.";

/// Device information command.
pub const INFO_DEVICE: &str = "info device";

/// Uptime command.
pub const UPTIME: &str = "uptime";

/// Free memory command.
pub const FREE: &str = "free";

/// Default storage root.
pub const DEFAULT_STORAGE_PATH: &str = "/ext";

/// A storage operation with fallback syntaxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    /// List a directory.
    List,
    /// Read a file.
    Read,
    /// Delete a file.
    Delete,
}

impl StorageOp {
    /// Candidate commands for `path`, in the order they are tried.
    #[must_use]
    pub fn candidates(self, path: &str) -> Vec<String> {
        match self {
            Self::List => vec![
                format!("storage list {path}"),
                format!("ls {path}"),
                "storage list".to_string(),
                "ls".to_string(),
            ],
            Self::Read => vec![format!("storage read {path}"), format!("cat {path}")],
            Self::Delete => vec![format!("storage delete {path}"), format!("rm {path}")],
        }
    }

    /// Returns the usable body of `response` to `command`, if it settles the operation.
    ///
    /// The echoed command line and the trailing prompt are dropped first. A
    /// body that mentions an error anywhere never settles. A silent device
    /// is a successful delete but an empty listing or read.
    #[must_use]
    pub fn settle(self, command: &str, response: &str) -> Option<String> {
        let body = strip_echo(command, response);
        if reports_error(body) {
            return None;
        }
        match self {
            Self::List | Self::Read => {
                (!body.is_empty() && body != COMMAND_SENT).then(|| body.to_string())
            }
            Self::Delete => Some(body.to_string()),
        }
    }
}

/// CLI prompt printed after every command.
const PROMPT: &str = ">:";

/// Drops a leading echo of `command` and a trailing prompt line.
#[must_use]
pub fn strip_echo<'a>(command: &str, response: &'a str) -> &'a str {
    let mut body = response.trim();
    if let Some(rest) = body
        .strip_prefix(command)
        .filter(|rest| rest.is_empty() || rest.starts_with(['\r', '\n']))
    {
        body = rest.trim_start();
    }
    if let Some(rest) = body
        .strip_suffix(PROMPT)
        .filter(|rest| rest.is_empty() || rest.ends_with(['\r', '\n']))
    {
        body = rest.trim_end();
    }
    body
}

/// Returns true if a response mentions an error anywhere, ignoring case.
#[must_use]
pub fn reports_error(response: &str) -> bool {
    response.to_ascii_lowercase().contains("error")
}

/// Splits a response into trimmed, non-empty lines.
#[must_use]
pub fn split_lines(response: &str) -> Vec<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_candidates_order() {
        assert_eq!(
            StorageOp::List.candidates("/ext/subghz"),
            vec![
                "storage list /ext/subghz",
                "ls /ext/subghz",
                "storage list",
                "ls"
            ]
        );
    }

    #[test]
    fn test_read_and_delete_candidates() {
        assert_eq!(
            StorageOp::Read.candidates("/ext/a.sub"),
            vec!["storage read /ext/a.sub", "cat /ext/a.sub"]
        );
        assert_eq!(
            StorageOp::Delete.candidates("/ext/a.sub"),
            vec!["storage delete /ext/a.sub", "rm /ext/a.sub"]
        );
    }

    #[test]
    fn test_settle() {
        let list = "storage list /ext";
        assert_eq!(
            StorageOp::List.settle(list, "[D] subghz\n[F] a.sub 12b"),
            Some("[D] subghz\n[F] a.sub 12b".to_string())
        );
        assert_eq!(StorageOp::List.settle(list, COMMAND_SENT), None);
        assert_eq!(
            StorageOp::Read.settle("cat /ext/a", "Storage error: file not found"),
            None
        );
        assert_eq!(
            StorageOp::Delete.settle("rm /ext/a", COMMAND_SENT),
            Some(COMMAND_SENT.to_string())
        );
        assert_eq!(StorageOp::Delete.settle("rm /ext/a", "Error: invalid path"), None);
    }

    #[test]
    fn test_settle_rejects_error_after_echo() {
        let command = "storage delete /ext/x";
        let response = "storage delete /ext/x\r\nStorage error: file not found\r\n>: ";
        assert_eq!(StorageOp::Delete.settle(command, response), None);
        assert_eq!(
            StorageOp::Read.settle("storage read /ext/x", "storage read /ext/x\r\nSize: 3\r\nERROR"),
            None
        );
    }

    #[test]
    fn test_settle_ignores_echoed_path() {
        let command = "storage read /ext/error_log.txt";
        let response = "storage read /ext/error_log.txt\r\nSize: 5\r\nhello\r\n>: ";
        assert_eq!(
            StorageOp::Read.settle(command, response),
            Some("Size: 5\r\nhello".to_string())
        );
    }

    #[test]
    fn test_echo_only_delete_is_success() {
        let command = "storage delete /ext/a.sub";
        assert_eq!(
            StorageOp::Delete.settle(command, "storage delete /ext/a.sub\r\n>: "),
            Some(String::new())
        );
        assert_eq!(
            StorageOp::List.settle("ls /ext", "ls /ext\r\n>: "),
            None
        );
    }

    #[test]
    fn test_strip_echo_keeps_unrelated_first_line() {
        assert_eq!(strip_echo("ls", "lsblk output"), "lsblk output");
        assert_eq!(strip_echo("ls", "ls\n[D] ext"), "[D] ext");
    }

    #[test]
    fn test_split_lines() {
        assert_eq!(
            split_lines("  hardware_model : Flipper Zero \r\n\r\n firmware : 0.98 \n"),
            vec!["hardware_model : Flipper Zero", "firmware : 0.98"]
        );
    }
}
