use serde::{Deserialize, Serialize};

/// Request body sent to the scoring endpoint.
#[derive(Debug, Serialize)]
pub struct ClassifyRequest {
    pub url: String,
    pub languages: Vec<String>,
    pub image_base64: String,
}

/// Structured response of the scoring endpoint. `reasoning` is advisory
/// text and only surfaces in debug logs.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifyResponse {
    #[serde(rename = "isLoginPage", default)]
    pub is_login_page: f64,
    #[serde(rename = "isPhishing", default)]
    pub is_phishing: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(rename = "websiteDomain", default)]
    pub website_domain: Option<String>,
    #[serde(default)]
    pub error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierVerdict {
    pub phishing: bool,
    pub error: bool,
}

pub fn build_request(url: &str, languages: &[String], image_base64: &str) -> ClassifyRequest {
    ClassifyRequest {
        url: url.to_string(),
        languages: languages.to_vec(),
        image_base64: image_base64.to_string(),
    }
}

/// Turns the model scores into a binary verdict.
///
/// A page is flagged when the model is confident it is both a login page
/// and phishing, or when a low-confidence login page claims an identity
/// (`websiteDomain`) that the visited hostname does not belong to.
/// A response with the error flag set fails open.
pub fn decide(hostname: &str, response: &ClassifyResponse) -> ClassifierVerdict {
    if response.error {
        return ClassifierVerdict {
            phishing: false,
            error: true,
        };
    }

    let login_page = response.is_login_page > 0.5;
    let confident_phishing = response.is_phishing > 0.5;

    let spoofed_identity = response
        .website_domain
        .as_deref()
        .filter(|domain| !domain.is_empty())
        .map(|domain| {
            !confident_phishing && login_page && !hostname.ends_with(&domain.to_lowercase())
        })
        .unwrap_or(false);

    ClassifierVerdict {
        phishing: (confident_phishing && login_page) || spoofed_identity,
        error: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(
        is_phishing: f64,
        is_login_page: f64,
        website_domain: Option<&str>,
        error: bool,
    ) -> ClassifyResponse {
        ClassifyResponse {
            is_login_page,
            is_phishing,
            reasoning: String::new(),
            website_domain: website_domain.map(|d| d.to_string()),
            error,
        }
    }

    #[test]
    fn confident_phishing_login_page_is_flagged() {
        let verdict = decide("evil.com", &response(0.9, 0.9, None, false));
        assert_eq!(
            verdict,
            ClassifierVerdict {
                phishing: true,
                error: false
            }
        );
    }

    #[test]
    fn login_page_on_foreign_domain_is_flagged() {
        let verdict = decide("evil.com", &response(0.3, 0.9, Some("bank.com"), false));
        assert!(verdict.phishing);
        assert!(!verdict.error);
    }

    #[test]
    fn login_page_on_claimed_domain_passes() {
        let verdict = decide("sub.bank.com", &response(0.3, 0.9, Some("bank.com"), false));
        assert!(!verdict.phishing);
    }

    #[test]
    fn low_scores_pass() {
        let verdict = decide("example.com", &response(0.2, 0.2, None, false));
        assert!(!verdict.phishing);
    }

    #[test]
    fn error_flag_fails_open() {
        let verdict = decide("evil.com", &response(0.9, 0.9, Some("bank.com"), true));
        assert_eq!(
            verdict,
            ClassifierVerdict {
                phishing: false,
                error: true
            }
        );
    }

    #[test]
    fn empty_website_domain_is_treated_as_absent() {
        let verdict = decide("evil.com", &response(0.3, 0.9, Some(""), false));
        assert!(!verdict.phishing);
    }

    #[test]
    fn response_defaults_tolerate_missing_fields() {
        let parsed: ClassifyResponse = serde_json::from_str(r#"{"error": true}"#).unwrap();
        assert!(parsed.error);
        assert_eq!(parsed.is_phishing, 0.0);
        assert!(parsed.website_domain.is_none());
    }
}
