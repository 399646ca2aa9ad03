// src/translate.rs
//! Translation collaborator: trait + adapters (Google, Papago, offline tagging).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::CollaboratorError;

#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` from `source_lang` into `target_locale`.
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_locale: &str,
    ) -> Result<String, CollaboratorError>;

    fn name(&self) -> &'static str;
}

/// Which HTTP translation backend `TRANSLATION_PROVIDER` selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Google,
    Papago,
}

impl Provider {
    /// `TRANSLATION_PROVIDER`, default google. Unknown values fall back to google.
    pub fn from_env() -> Self {
        match std::env::var("TRANSLATION_PROVIDER")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "papago" => Self::Papago,
            _ => Self::Google,
        }
    }
}

/// Build the configured HTTP translator.
pub fn from_env() -> Result<Box<dyn Translator>, CollaboratorError> {
    Ok(match Provider::from_env() {
        Provider::Google => Box::new(GoogleTranslator::from_env()?),
        Provider::Papago => Box::new(PapagoTranslator::from_env()?),
    })
}

/// Length-ratio heuristic for a translated title+body pair.
///
/// Scripts differ in density, so a translation much longer or shorter than its
/// source is treated as less trustworthy. Result is clamped to [0, 1].
pub fn ratio_confidence(
    original_title: &str,
    translated_title: &str,
    original_body: &str,
    translated_body: &str,
) -> f32 {
    fn ratio(translated: &str, original: &str) -> f32 {
        let (t, o) = (translated.chars().count(), original.chars().count());
        if o == 0 {
            return if t == 0 { 1.0 } else { t as f32 };
        }
        t as f32 / o as f32
    }
    let body = 1.0 - (ratio(translated_body, original_body) - 1.0).abs() * 0.3;
    let title = 1.0 - (ratio(translated_title, original_title) - 1.0).abs() * 0.2;
    ((body + title) / 2.0).clamp(0.0, 1.0)
}

/// Google Cloud Translation v2 REST.
pub struct GoogleTranslator {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

#[derive(Deserialize)]
struct GoogleResponse {
    data: GoogleData,
}

#[derive(Deserialize)]
struct GoogleData {
    translations: Vec<GoogleTranslation>,
}

#[derive(Deserialize)]
struct GoogleTranslation {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

impl GoogleTranslator {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            endpoint: "https://translation.googleapis.com/language/translate/v2".to_string(),
        }
    }

    /// `GOOGLE_TRANSLATE_API_KEY` must be set.
    pub fn from_env() -> Result<Self, CollaboratorError> {
        std::env::var("GOOGLE_TRANSLATE_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(Self::new)
            .ok_or(CollaboratorError::NotConfigured("GOOGLE_TRANSLATE_API_KEY"))
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_locale: &str,
    ) -> Result<String, CollaboratorError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let rsp = self
            .client
            .post(&self.endpoint)
            .timeout(Duration::from_secs(10))
            .query(&[("key", self.api_key.as_str())])
            .json(&serde_json::json!({
                "q": text,
                "source": source_lang,
                "target": target_locale,
                "format": "text",
            }))
            .send()
            .await
            .map_err(|e| CollaboratorError::from_reqwest("google-translate", e))?;

        let status = rsp.status();
        if !status.is_success() {
            let detail = rsp.text().await.unwrap_or_default();
            return Err(CollaboratorError::from_status(
                "google-translate",
                status.as_u16(),
                &detail,
            ));
        }

        let body: GoogleResponse = rsp
            .json()
            .await
            .map_err(|e| CollaboratorError::Malformed(format!("google-translate: {e}")))?;
        body.data
            .translations
            .into_iter()
            .next()
            .map(|t| html_escape::decode_html_entities(&t.translated_text).to_string())
            .ok_or_else(|| CollaboratorError::Malformed("google-translate: empty result".into()))
    }

    fn name(&self) -> &'static str {
        "google"
    }
}

/// Naver Papago NMT.
pub struct PapagoTranslator {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    endpoint: String,
}

#[derive(Deserialize)]
struct PapagoResponse {
    message: PapagoMessage,
}

#[derive(Deserialize)]
struct PapagoMessage {
    result: PapagoResult,
}

#[derive(Deserialize)]
struct PapagoResult {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// Papago names simplified Chinese `zh-CN`; other codes pass through.
fn papago_lang(code: &str) -> &str {
    match code {
        "zh" => "zh-CN",
        other => other,
    }
}

impl PapagoTranslator {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
            client_secret,
            endpoint: "https://openapi.naver.com/v1/papago/n2mt".to_string(),
        }
    }

    /// `PAPAGO_CLIENT_ID` and `PAPAGO_CLIENT_SECRET` must be set.
    pub fn from_env() -> Result<Self, CollaboratorError> {
        let var = |key: &'static str| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or(CollaboratorError::NotConfigured(key))
        };
        Ok(Self::new(var("PAPAGO_CLIENT_ID")?, var("PAPAGO_CLIENT_SECRET")?))
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Translator for PapagoTranslator {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_locale: &str,
    ) -> Result<String, CollaboratorError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let rsp = self
            .client
            .post(&self.endpoint)
            .timeout(Duration::from_secs(10))
            .header("X-Naver-Client-Id", &self.client_id)
            .header("X-Naver-Client-Secret", &self.client_secret)
            .form(&[
                ("source", papago_lang(source_lang)),
                ("target", papago_lang(target_locale)),
                ("text", text),
            ])
            .send()
            .await
            .map_err(|e| CollaboratorError::from_reqwest("papago", e))?;

        let status = rsp.status();
        if !status.is_success() {
            let detail = rsp.text().await.unwrap_or_default();
            return Err(CollaboratorError::from_status("papago", status.as_u16(), &detail));
        }

        let body: PapagoResponse = rsp
            .json()
            .await
            .map_err(|e| CollaboratorError::Malformed(format!("papago: {e}")))?;
        Ok(body.message.result.translated_text)
    }

    fn name(&self) -> &'static str {
        "papago"
    }
}

/// Offline fallback: marks the text with its language pair instead of translating.
/// Used when no translation API key is configured and in tests.
#[derive(Debug, Default, Clone)]
pub struct TaggingTranslator;

#[async_trait]
impl Translator for TaggingTranslator {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_locale: &str,
    ) -> Result<String, CollaboratorError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        Ok(format!("[{source_lang}->{target_locale}] {text}"))
    }

    fn name(&self) -> &'static str {
        "tagging"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_lengths_give_full_confidence() {
        let c = ratio_confidence("abcd", "wxyz", "hello world", "HELLO WORLD");
        assert!((c - 1.0).abs() < 1e-6);
    }

    #[test]
    fn confidence_drops_with_length_drift_and_is_clamped() {
        let c = ratio_confidence("abcd", "ab", "0123456789", "01234");
        // body ratio 0.5 -> 0.85, title ratio 0.5 -> 0.9
        assert!((c - 0.875).abs() < 1e-6);
        let wild = ratio_confidence("a", &"x".repeat(50), "a", &"y".repeat(50));
        assert_eq!(wild, 0.0);
    }

    #[tokio::test]
    async fn tagging_translator_marks_language_pair() {
        let t = TaggingTranslator
            .translate("New model", "en", "ko")
            .await
            .unwrap();
        assert_eq!(t, "[en->ko] New model");
    }

    #[test]
    fn empty_field_on_both_sides_counts_as_exact() {
        let c = ratio_confidence("abcd", "wxyz", "", "");
        assert!((c - 1.0).abs() < 1e-6);
    }

    #[test]
    fn papago_response_and_language_codes() {
        let raw = r#"{"message":{"result":{"srcLangType":"en","tarLangType":"ko","translatedText":"새 모델"}}}"#;
        let parsed: PapagoResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.message.result.translated_text, "새 모델");
        assert_eq!(papago_lang("zh"), "zh-CN");
        assert_eq!(papago_lang("en"), "en");
    }

    #[test]
    #[serial_test::serial]
    fn provider_selection_follows_env() {
        std::env::set_var("TRANSLATION_PROVIDER", "Papago");
        assert_eq!(Provider::from_env(), Provider::Papago);
        std::env::remove_var("PAPAGO_CLIENT_ID");
        assert!(matches!(
            from_env().err(),
            Some(CollaboratorError::NotConfigured("PAPAGO_CLIENT_ID"))
        ));
        std::env::remove_var("TRANSLATION_PROVIDER");
        assert_eq!(Provider::from_env(), Provider::Google);
    }

    #[test]
    #[serial_test::serial]
    fn google_requires_api_key() {
        std::env::remove_var("GOOGLE_TRANSLATE_API_KEY");
        assert!(matches!(
            GoogleTranslator::from_env(),
            Err(CollaboratorError::NotConfigured(_))
        ));
    }
}
