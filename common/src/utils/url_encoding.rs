//! Slack webhook URL rewriting for notification relays that expect
//! credentials in the userinfo part of the URL.

const SLACK_HOOKS_PREFIX: &str = "https://hooks.slack.com/services/";

/// Rewrites `https://hooks.slack.com/services/A/B/C` into
/// `http://:A%2FB%2FC@https%3A%2F%2Fhooks.slack.com%2Fservices`.
///
/// Returns an empty string for anything that is not a Slack hook URL.
pub fn transform_slack_url(original_url: &str) -> String {
    match original_url.strip_prefix(SLACK_HOOKS_PREFIX) {
        Some(token) => {
            let token = token.replace('/', "%2F").replace(':', "%3A");
            format!("http://:{}@https%3A%2F%2Fhooks.slack.com%2Fservices", token)
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_slack_url() {
        assert_eq!(
            transform_slack_url("https://hooks.slack.com/services/T000/B000/XXXX"),
            "http://:T000%2FB000%2FXXXX@https%3A%2F%2Fhooks.slack.com%2Fservices"
        );
    }

    #[test]
    fn test_other_urls_are_blank() {
        assert_eq!(transform_slack_url("https://example.com/hook"), "");
    }
}
