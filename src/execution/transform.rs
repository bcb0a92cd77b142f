//! Command rewriting for user and host switching.
//!
//! These are pure functions: the same inputs always yield the same shell
//! text, and nothing is executed here.

use serde::{Deserialize, Serialize};

/// Host value that means "this machine".
pub const LOCALHOST: &str = "localhost";

/// Fixed connection flags for remote execution.
pub const SSH_OPTIONS: &str =
    "-Tq -o PasswordAuthentication=no -o StrictHostKeyChecking=no -o ConnectTimeout=2";

/// How to become another user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Escalation {
    /// `sudo su -lc "<cmd>" <user>`: full login session for the target user.
    #[default]
    LoginShell,
    /// `sudo -u <user> -H "<cmd>"`: identity and home directory only.
    SudoUser,
}

impl std::str::FromStr for Escalation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "login_shell" | "login-shell" | "su" => Ok(Self::LoginShell),
            "sudo_user" | "sudo-user" | "sudo" => Ok(Self::SudoUser),
            other => Err(format!("unknown escalation style: {other}")),
        }
    }
}

/// Escape text for embedding inside a double-quoted shell word.
///
/// Backslash must be escaped first; escaping it after the quote or dollar
/// sign would double the backslashes those escapes introduce.
pub fn escape_double_quoted(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "\\$")
}

/// Wrap `cmd` so it runs as `user`.
///
/// Returns `cmd` unchanged when no user is given or the user is empty.
pub fn apply_user(cmd: &str, user: Option<&str>, escalation: Escalation) -> String {
    let user = match user {
        None | Some("") => return cmd.to_string(),
        Some(user) => user,
    };
    let inner = escape_double_quoted(cmd);
    match escalation {
        Escalation::LoginShell => format!(r#"sudo su -lc "{inner}" {user}"#),
        Escalation::SudoUser => format!(r#"sudo -u {user} -H "{inner}""#),
    }
}

/// Wrap `cmd` so it runs on `host` over ssh.
///
/// Returns `cmd` unchanged when no host is given, the host is empty, or the
/// host is `localhost`.
pub fn apply_host(cmd: &str, host: Option<&str>) -> String {
    match host {
        None | Some("") | Some(LOCALHOST) => cmd.to_string(),
        Some(host) => format!(
            r#"ssh {SSH_OPTIONS} {host} "{}""#,
            escape_double_quoted(cmd)
        ),
    }
}

/// Apply user switching, then host switching.
///
/// The user switch ends up inside the remote command, so escalation happens
/// on the far side.
pub fn transform(cmd: &str, user: Option<&str>, host: Option<&str>, escalation: Escalation) -> String {
    apply_host(&apply_user(cmd, user, escalation), host)
}
