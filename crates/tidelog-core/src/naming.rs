//! Topic and consumer group naming rules.
//!
//! Names end up as path segments in byte stores, so they are restricted to
//! Kafka's legal topic characters `[A-Za-z0-9._-]`.

use crate::error::{Error, Result};

/// Maximum length of a topic or group name.
pub const MAX_NAME_LEN: usize = 249;

/// Validate a topic or consumer group name.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason| {
        Err(Error::InvalidName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return invalid("name must not be empty");
    }
    if name.len() > MAX_NAME_LEN {
        return invalid("name is longer than 249 characters");
    }
    if name == "." || name == ".." {
        return invalid("'.' and '..' are reserved");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return invalid("only ASCII letters, digits, '.', '_' and '-' are allowed");
    }
    Ok(())
}

/// Minimal glob matcher supporting `*` and `?`.
pub fn glob_match(pattern: &str, input: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let inp: Vec<char> = input.chars().collect();
    let (plen, ilen) = (pat.len(), inp.len());

    let mut dp = vec![vec![false; ilen + 1]; plen + 1];
    dp[0][0] = true;

    for i in 1..=plen {
        if pat[i - 1] == '*' {
            dp[i][0] = dp[i - 1][0];
        }
    }

    for i in 1..=plen {
        for j in 1..=ilen {
            if pat[i - 1] == '*' {
                dp[i][j] = dp[i - 1][j] || dp[i][j - 1];
            } else if pat[i - 1] == '?' || pat[i - 1] == inp[j - 1] {
                dp[i][j] = dp[i - 1][j - 1];
            }
        }
    }

    dp[plen][ilen]
}
