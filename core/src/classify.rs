//! Shell command classification
//!
//! Maps a raw command string to a typed [`Operation`] plus an optional
//! detail string. Matching is prefix-based on the lowercased, trimmed
//! command: the skip list is consulted first, then the ordered table of
//! file-modifying prefixes, and anything left over is a plain `Execute`.
//!
//! Compound commands (`ls && rm -rf x`) are classified by their first
//! command only.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::{CommandCategory, Operation};

/// Maximum length of an extracted commit message.
const COMMIT_MESSAGE_MAX_CHARS: usize = 200;

/// Commands that should be skipped (read-only)
pub const SKIP_PREFIXES: &[&str] = &[
    "ls", "cat", "head", "tail", "less", "more",
    "grep", "rg", "find", "fd", "ag",
    "git status", "git log", "git diff", "git branch", "git show",
    "pwd", "cd", "echo", "printf", "which", "whereis",
    "ps", "top", "htop", "df", "du",
    "python3 -c", "node -e",
];

/// How the detail string is pulled out of a matched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailRule {
    /// `-m`/`--message` argument, heredoc bodies excluded
    CommitMessage,
    /// First non-flag argument
    FirstOperand,
    /// `"<first> → <last>"` over the non-flag arguments
    SourceToDestination,
    None,
}

/// File-modifying prefixes, first match wins.
pub const MODIFYING_COMMANDS: &[(&str, Operation, DetailRule)] = &[
    ("git commit", Operation::Commit, DetailRule::CommitMessage),
    ("git merge", Operation::Commit, DetailRule::None),
    ("rm -rf", Operation::Delete, DetailRule::FirstOperand),
    ("rm -r", Operation::Delete, DetailRule::FirstOperand),
    ("rm", Operation::Delete, DetailRule::FirstOperand),
    ("mv", Operation::Move, DetailRule::SourceToDestination),
    ("cp", Operation::Copy, DetailRule::SourceToDestination),
    ("touch", Operation::Create, DetailRule::None),
    ("mkdir -p", Operation::Create, DetailRule::None),
    ("mkdir", Operation::Create, DetailRule::None),
    ("chmod", Operation::Modify, DetailRule::None),
    ("chown", Operation::Modify, DetailRule::None),
];

/// Classify a shell command.
///
/// Returns `(Operation::Unknown, None)` for read-only commands, which callers
/// must not record, and `(Operation::Execute, None)` for unmatched commands.
pub fn classify_command(command: &str) -> (Operation, Option<String>) {
    let cmd = command.trim();
    let cmd_lower = cmd.to_lowercase();

    if SKIP_PREFIXES.iter().any(|p| cmd_lower.starts_with(p)) {
        return (Operation::Unknown, None);
    }

    for (prefix, operation, rule) in MODIFYING_COMMANDS {
        if cmd_lower.starts_with(prefix) {
            return (*operation, extract_detail(cmd, *rule));
        }
    }

    (Operation::Execute, None)
}

/// Semantic category of a shell command, stored as metadata.
pub fn command_category(command: &str) -> CommandCategory {
    let cmd_lower = command.trim().to_lowercase();
    let starts = |prefixes: &[&str]| prefixes.iter().any(|p| cmd_lower.starts_with(p));

    if starts(&["git "]) {
        return CommandCategory::Git;
    }

    if starts(&[
        "npm test", "yarn test", "pytest", "cargo test", "jest", "vitest", "go test",
    ]) || cmd_lower.contains("test")
    {
        return CommandCategory::Test;
    }

    if starts(&[
        "npm run build", "yarn build", "cargo build", "make", "go build", "tsc", "webpack",
        "vite build",
    ]) {
        return CommandCategory::Build;
    }

    if cmd_lower.contains("deploy")
        || starts(&["vercel", "netlify", "fly ", "docker push", "kubectl apply"])
    {
        return CommandCategory::Deploy;
    }

    if starts(&[
        "npm install", "npm uninstall", "yarn add", "yarn remove", "pip install",
        "pip uninstall", "cargo add", "cargo remove", "brew install", "apt install",
    ]) {
        return CommandCategory::Package;
    }

    if starts(&["rm", "mv", "cp", "touch", "mkdir", "chmod", "chown"]) {
        return CommandCategory::FileOps;
    }

    CommandCategory::Unknown
}

fn extract_detail(cmd: &str, rule: DetailRule) -> Option<String> {
    match rule {
        DetailRule::CommitMessage => commit_message(cmd),
        DetailRule::FirstOperand => operands(cmd).first().map(|s| s.to_string()),
        DetailRule::SourceToDestination => {
            let args = operands(cmd);
            match (args.first(), args.last()) {
                (Some(src), Some(dst)) if args.len() >= 2 => Some(format!("{} → {}", src, dst)),
                _ => None,
            }
        }
        DetailRule::None => None,
    }
}

/// Non-flag arguments after the command word.
fn operands(cmd: &str) -> Vec<&str> {
    cmd.split_whitespace()
        .skip(1)
        .filter(|p| !p.starts_with('-'))
        .collect()
}

fn message_flag_re() -> &'static Regex {
    static MESSAGE_FLAG_RE: OnceLock<Regex> = OnceLock::new();
    MESSAGE_FLAG_RE.get_or_init(|| {
        Regex::new(r"(?s)(?:^|\s)(?:--message|-[a-zA-Z]*m)(?:=|\s*)(.*)$")
            .expect("valid message flag regex")
    })
}

fn commit_message(cmd: &str) -> Option<String> {
    let rest = message_flag_re().captures(cmd)?.get(1)?.as_str().trim_start();

    let mut chars = rest.chars();
    let message = match chars.next() {
        Some(quote @ ('"' | '\'')) => {
            let body = chars.as_str();
            match body.find(quote) {
                Some(end) => &body[..end],
                None => body,
            }
        }
        _ => rest.trim().trim_matches('"').trim_matches('\''),
    };

    // Heredoc bodies (`"$(cat <<'EOF' ...`) are not a message
    let cut = [message.find("$("), message.find("<<")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(message.len());
    let message = message[..cut].trim();

    if message.is_empty() {
        None
    } else {
        Some(message.chars().take(COMMIT_MESSAGE_MAX_CHARS).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_list_returns_unknown() {
        for cmd in [
            "ls -la",
            "cat README.md",
            "git status",
            "git log --oneline",
            "git diff HEAD~1",
            "grep -r foo src/",
            "pwd",
            "ps aux",
            "python3 -c 'print(1)'",
            "node -e 'console.log(1)'",
            "  LS -la  ",
        ] {
            assert_eq!(classify_command(cmd), (Operation::Unknown, None), "{}", cmd);
        }
    }

    #[test]
    fn test_commit_message_extraction() {
        assert_eq!(
            classify_command("git commit -m 'x'"),
            (Operation::Commit, Some("x".to_string()))
        );
        assert_eq!(
            classify_command(r#"git commit -m "Fix Login Bug" --no-verify"#),
            (Operation::Commit, Some("Fix Login Bug".to_string()))
        );
        assert_eq!(
            classify_command("git commit -am 'wip'"),
            (Operation::Commit, Some("wip".to_string()))
        );
        assert_eq!(
            classify_command("git commit --message=release"),
            (Operation::Commit, Some("release".to_string()))
        );
        assert_eq!(classify_command("git commit"), (Operation::Commit, None));
    }

    #[test]
    fn test_commit_message_heredoc_excluded() {
        let cmd = "git commit -m \"$(cat <<'EOF'\nAdd parser\n\nLong body\nEOF\n)\"";
        assert_eq!(classify_command(cmd), (Operation::Commit, None));
    }

    #[test]
    fn test_commit_message_truncated() {
        let long = "a".repeat(300);
        let (op, detail) = classify_command(&format!("git commit -m '{}'", long));
        assert_eq!(op, Operation::Commit);
        assert_eq!(detail.unwrap().chars().count(), 200);
    }

    #[test]
    fn test_merge_is_commit_without_detail() {
        assert_eq!(classify_command("git merge feature/x"), (Operation::Commit, None));
    }

    #[test]
    fn test_delete_first_operand() {
        assert_eq!(
            classify_command("rm -rf build/"),
            (Operation::Delete, Some("build/".to_string()))
        );
        assert_eq!(
            classify_command("rm old.txt new.txt"),
            (Operation::Delete, Some("old.txt".to_string()))
        );
        assert_eq!(classify_command("rm -f"), (Operation::Delete, None));
    }

    #[test]
    fn test_move_and_copy_render_arrow() {
        assert_eq!(
            classify_command("mv a.txt b.txt"),
            (Operation::Move, Some("a.txt → b.txt".to_string()))
        );
        assert_eq!(
            classify_command("cp -r src/ a b dest/"),
            (Operation::Copy, Some("src/ → dest/".to_string()))
        );
        // Detail uses the original casing
        assert_eq!(
            classify_command("MV Old.TXT New.TXT"),
            (Operation::Move, Some("Old.TXT → New.TXT".to_string()))
        );
    }

    #[test]
    fn test_move_with_single_operand_has_no_detail() {
        assert_eq!(classify_command("mv a.txt"), (Operation::Move, None));
        assert_eq!(classify_command("cp -v"), (Operation::Copy, None));
    }

    #[test]
    fn test_create_and_modify_prefixes() {
        assert_eq!(classify_command("touch new.rs"), (Operation::Create, None));
        assert_eq!(classify_command("mkdir -p a/b/c"), (Operation::Create, None));
        assert_eq!(classify_command("chmod +x run.sh"), (Operation::Modify, None));
        assert_eq!(classify_command("chown me file"), (Operation::Modify, None));
    }

    #[test]
    fn test_unmatched_is_execute() {
        assert_eq!(classify_command("cargo build --release"), (Operation::Execute, None));
        assert_eq!(classify_command("npm test"), (Operation::Execute, None));
    }

    #[test]
    fn test_table_order_is_pinned() {
        let prefixes: Vec<&str> = MODIFYING_COMMANDS.iter().map(|(p, _, _)| *p).collect();
        assert_eq!(
            prefixes,
            vec![
                "git commit", "git merge", "rm -rf", "rm -r", "rm", "mv", "cp", "touch",
                "mkdir -p", "mkdir", "chmod", "chown",
            ]
        );
    }

    #[test]
    fn test_prefix_matching_is_not_token_based() {
        // "rmdir" starts with "rm", "cpio" with "cp"
        assert_eq!(
            classify_command("rmdir empty/"),
            (Operation::Delete, Some("empty/".to_string()))
        );
        assert_eq!(classify_command("cpio -i").0, Operation::Copy);
    }

    #[test]
    fn test_compound_command_matches_first_command_only() {
        // Known limitation: the skip list wins on the first command
        assert_eq!(classify_command("ls && rm -rf x"), (Operation::Unknown, None));
        assert_eq!(classify_command("cd src && rm a.rs"), (Operation::Unknown, None));
    }

    #[test]
    fn test_command_category() {
        assert_eq!(command_category("git push origin main"), CommandCategory::Git);
        assert_eq!(command_category("cargo test -p core"), CommandCategory::Test);
        assert_eq!(command_category("cargo build"), CommandCategory::Build);
        assert_eq!(command_category("kubectl apply -f x.yaml"), CommandCategory::Deploy);
        assert_eq!(command_category("npm install lodash"), CommandCategory::Package);
        assert_eq!(command_category("rm -rf dist"), CommandCategory::FileOps);
        assert_eq!(command_category("docker compose up"), CommandCategory::Unknown);
    }
}
