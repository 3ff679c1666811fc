use std::process::Command;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tracing::info;

use crate::config::Config;

/// The external "text in, text out, may fail or time out" capability
/// the answer synthesizer delegates prose to. Implementations block;
/// callers dispatch them on the blocking pool.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationProviderKind {
    Openai,
    Ollama,
}

impl GenerationProviderKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::Openai),
            "ollama" | "local" => Ok(Self::Ollama),
            other => bail!(
                "Unsupported BHUJAL_GENERATION_PROVIDER `{other}`. Supported: openai, ollama/local."
            ),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Ollama => "ollama",
        }
    }
}

pub fn default_model_for_provider(provider: GenerationProviderKind) -> &'static str {
    match provider {
        GenerationProviderKind::Openai => "gpt-4o-mini",
        GenerationProviderKind::Ollama => "llama3.1",
    }
}

#[derive(Debug, Clone)]
pub struct GenerationClient {
    provider: GenerationProviderKind,
    model: String,
    openai_api_key: Option<String>,
    openai_base_url: String,
    ollama_host: String,
    request_timeout_seconds: u64,
}

impl GenerationClient {
    /// Build from configuration. `Ok(None)` when no provider is set:
    /// the service still starts and the ask surface degrades instead.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        let Some(provider_raw) = config.generation_provider.as_deref() else {
            return Ok(None);
        };
        let provider = GenerationProviderKind::parse(provider_raw)?;
        let model = config
            .generation_model
            .clone()
            .unwrap_or_else(|| default_model_for_provider(provider).to_string());

        let client = Self {
            provider,
            model,
            openai_api_key: config.openai_api_key.clone(),
            openai_base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            ollama_host: config.ollama_host.trim_end_matches('/').to_string(),
            request_timeout_seconds: config.generation_timeout_seconds.max(1),
        };
        client.validate_runtime_requirements()?;
        info!(
            provider = client.provider.as_str(),
            model = %client.model,
            "Generation provider configured"
        );
        Ok(Some(client))
    }

    fn validate_runtime_requirements(&self) -> Result<()> {
        match self.provider {
            GenerationProviderKind::Openai => {
                if self
                    .openai_api_key
                    .as_deref()
                    .unwrap_or_default()
                    .trim()
                    .is_empty()
                {
                    bail!("Generation misconfiguration: provider=openai requires OPENAI_API_KEY.");
                }
            }
            GenerationProviderKind::Ollama => {
                if self.ollama_host.trim().is_empty() {
                    bail!(
                        "Generation misconfiguration: provider=ollama/local requires OLLAMA_HOST."
                    );
                }
            }
        }
        if self.model.trim().is_empty() {
            bail!("Generation misconfiguration: BHUJAL_GENERATION_MODEL must be non-empty.");
        }
        Ok(())
    }

    fn generate_openai(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }]
        });
        let response = execute_curl_json(
            &format!("{}/chat/completions", self.openai_base_url),
            Some(format!(
                "Authorization: Bearer {}",
                self.openai_api_key.as_deref().unwrap_or_default()
            )),
            self.request_timeout_seconds,
            body.to_string(),
        )?;
        extract_completion_text(&response)
    }

    fn generate_ollama(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false
        });
        let response = execute_curl_json(
            &format!("{}/api/generate", self.ollama_host),
            None,
            self.request_timeout_seconds,
            body.to_string(),
        )?;
        extract_completion_text(&response)
    }
}

impl TextGenerator for GenerationClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        match self.provider {
            GenerationProviderKind::Openai => self.generate_openai(prompt),
            GenerationProviderKind::Ollama => self.generate_ollama(prompt),
        }
    }
}

/// Stand-in when no provider is configured: every call fails, so ask
/// responses carry the synthesizer's unavailable message.
pub struct UnconfiguredGenerator;

impl TextGenerator for UnconfiguredGenerator {
    fn generate(&self, _prompt: &str) -> Result<String> {
        bail!("No generation provider configured")
    }
}

fn execute_curl_json(
    url: &str,
    auth_header: Option<String>,
    timeout_seconds: u64,
    body: String,
) -> Result<Value> {
    let mut command = Command::new("curl");
    command
        .arg("-sS")
        .arg("--max-time")
        .arg(timeout_seconds.to_string())
        .arg("-X")
        .arg("POST")
        .arg(url)
        .arg("-H")
        .arg("Content-Type: application/json")
        .arg("-d")
        .arg(body);

    if let Some(header) = auth_header {
        command.arg("-H").arg(header);
    }

    let output = command
        .output()
        .with_context(|| format!("Failed to execute curl for generation request to {url}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("Generation request failed: {}", stderr.trim());
    }

    let stdout =
        String::from_utf8(output.stdout).context("Generation provider response was not UTF-8")?;
    let parsed = serde_json::from_str::<Value>(&stdout).with_context(|| {
        format!(
            "Generation provider response was not valid JSON for {url}: {}",
            stdout.trim()
        )
    })?;

    if let Some(error) = parsed.get("error") {
        bail!("Generation provider returned error: {error}");
    }

    Ok(parsed)
}

fn extract_completion_text(response: &Value) -> Result<String> {
    // OpenAI-compatible chat shape.
    if let Some(text) = response
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
    {
        return Ok(text.to_string());
    }

    // Ollama generate shape.
    if let Some(text) = response.get("response").and_then(Value::as_str) {
        return Ok(text.to_string());
    }

    bail!("Generation response did not contain completion text.");
}

#[cfg(test)]
mod tests {
    use super::{extract_completion_text, GenerationProviderKind};
    use serde_json::json;

    #[test]
    fn provider_parse_accepts_known_tokens() {
        assert_eq!(
            GenerationProviderKind::parse("OpenAI").unwrap(),
            GenerationProviderKind::Openai
        );
        assert_eq!(
            GenerationProviderKind::parse("local").unwrap(),
            GenerationProviderKind::Ollama
        );
        assert!(GenerationProviderKind::parse("bedrock").is_err());
    }

    #[test]
    fn completion_text_is_extracted_from_both_shapes() {
        let openai = json!({
            "choices": [{ "message": { "content": "An aquifer stores groundwater." } }]
        });
        assert_eq!(
            extract_completion_text(&openai).unwrap(),
            "An aquifer stores groundwater."
        );

        let ollama = json!({ "response": "Recharge raises the water table." });
        assert_eq!(
            extract_completion_text(&ollama).unwrap(),
            "Recharge raises the water table."
        );

        assert!(extract_completion_text(&json!({})).is_err());
    }
}
