//! Parses a Git folder's `.git/config` to recover the `author/project`
//! pair the availability coordinator uses to build `Github` retrievers.

/// Parse the `url` of the first `[remote ...]` section in a `.git/config`
/// file, returning `(author, project)` if it points at GitHub.
#[must_use]
pub fn parse_github_remote(config_text: &str) -> Option<(String, String)> {
    let mut in_remote_section = false;
    for raw_line in config_text.lines() {
        let line = raw_line.trim();
        if line.starts_with('[') {
            in_remote_section = line.starts_with("[remote");
            continue;
        }
        if !in_remote_section {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if key.trim() != "url" {
            continue;
        }
        return parse_github_url(value.trim());
    }
    None
}

fn parse_github_url(url: &str) -> Option<(String, String)> {
    let rest = url
        .strip_prefix("https://github.com/")
        .or_else(|| url.strip_prefix("git@github.com:"))?;
    let rest = rest.strip_suffix(".git").unwrap_or(rest);
    let (author, project) = rest.split_once('/')?;
    if author.is_empty() || project.is_empty() {
        return None;
    }
    Some((author.to_string(), project.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_https_remote() {
        let config = "[core]\n\trepositoryformatversion = 0\n[remote \"origin\"]\n\turl = https://github.com/modauthor/ModProject.git\n\tfetch = +refs/heads/*:refs/remotes/origin/*\n";
        assert_eq!(
            parse_github_remote(config),
            Some(("modauthor".to_string(), "ModProject".to_string()))
        );
    }

    #[test]
    fn parses_ssh_remote_without_dot_git_suffix() {
        let config = "[remote \"origin\"]\n\turl = git@github.com:modauthor/ModProject\n";
        assert_eq!(
            parse_github_remote(config),
            Some(("modauthor".to_string(), "ModProject".to_string()))
        );
    }

    #[test]
    fn non_github_remote_is_none() {
        let config = "[remote \"origin\"]\n\turl = https://gitlab.com/modauthor/ModProject.git\n";
        assert_eq!(parse_github_remote(config), None);
    }

    #[test]
    fn missing_remote_section_is_none() {
        assert_eq!(parse_github_remote("[core]\n\tbare = false\n"), None);
    }
}
