// ABOUTME: Rewrites a command so stderr merging and exit status capture survive the remote shell.
// ABOUTME: The command runs in a subshell so its own exit cannot skip the trailing status print.

/// Appended after the subshell to print a newline and the subshell's status.
pub const EXIT_STATUS_SUFFIX: &str = r#";printf '\n%d' "$?""#;

/// Appended after the subshell to merge its stderr into stdout.
pub const MERGE_STDERR_SUFFIX: &str = " 2>&1";

/// Build the command actually sent to the remote shell.
///
/// The subshell is closed on its own line so a trailing `#` comment or a
/// heredoc terminator in the command cannot swallow the `)`. Without stream
/// merging or exit status capture the command is returned untouched.
pub fn wrap_command(command: &str, merge_stderr: bool, want_exit_code: bool) -> String {
    if !merge_stderr && !want_exit_code {
        return command.to_string();
    }

    let mut wrapped = format!("({}\n)", command);
    if merge_stderr {
        wrapped.push_str(MERGE_STDERR_SUFFIX);
    }
    if want_exit_code {
        wrapped.push_str(EXIT_STATUS_SUFFIX);
    }
    wrapped
}
