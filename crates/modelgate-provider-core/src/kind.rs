use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Jan,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Gemini,
    Mistral,
    Groq,
    Cohere,
    Ollama,
    Replicate,
    #[serde(rename = "azure_openai")]
    AzureOpenAi,
    AwsBedrock,
    Perplexity,
    #[serde(rename = "togetherai")]
    TogetherAi,
    #[serde(rename = "huggingface")]
    HuggingFace,
    #[serde(rename = "vercel_ai")]
    VercelAi,
    #[serde(rename = "deepinfra")]
    DeepInfra,
    Custom,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 18] = [
        ProviderKind::Jan,
        ProviderKind::OpenRouter,
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Gemini,
        ProviderKind::Mistral,
        ProviderKind::Groq,
        ProviderKind::Cohere,
        ProviderKind::Ollama,
        ProviderKind::Replicate,
        ProviderKind::AzureOpenAi,
        ProviderKind::AwsBedrock,
        ProviderKind::Perplexity,
        ProviderKind::TogetherAi,
        ProviderKind::HuggingFace,
        ProviderKind::VercelAi,
        ProviderKind::DeepInfra,
        ProviderKind::Custom,
    ];

    /// Case-insensitive vendor lookup; anything unrecognized is `Custom`.
    pub fn parse(vendor: &str) -> Self {
        match vendor.trim().to_ascii_lowercase().as_str() {
            "jan" => ProviderKind::Jan,
            "openrouter" => ProviderKind::OpenRouter,
            "openai" => ProviderKind::OpenAi,
            "anthropic" => ProviderKind::Anthropic,
            "gemini" | "google" | "googleai" => ProviderKind::Gemini,
            "mistral" => ProviderKind::Mistral,
            "groq" => ProviderKind::Groq,
            "cohere" => ProviderKind::Cohere,
            "ollama" => ProviderKind::Ollama,
            "replicate" => ProviderKind::Replicate,
            "azure_openai" | "azure-openai" => ProviderKind::AzureOpenAi,
            "aws_bedrock" | "bedrock" => ProviderKind::AwsBedrock,
            "perplexity" => ProviderKind::Perplexity,
            "togetherai" | "together" => ProviderKind::TogetherAi,
            "huggingface" => ProviderKind::HuggingFace,
            "vercel_ai" | "vercel-ai" | "vercel" => ProviderKind::VercelAi,
            "deepinfra" => ProviderKind::DeepInfra,
            _ => ProviderKind::Custom,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Jan => "jan",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Mistral => "mistral",
            ProviderKind::Groq => "groq",
            ProviderKind::Cohere => "cohere",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Replicate => "replicate",
            ProviderKind::AzureOpenAi => "azure_openai",
            ProviderKind::AwsBedrock => "aws_bedrock",
            ProviderKind::Perplexity => "perplexity",
            ProviderKind::TogetherAi => "togetherai",
            ProviderKind::HuggingFace => "huggingface",
            ProviderKind::VercelAi => "vercel_ai",
            ProviderKind::DeepInfra => "deepinfra",
            ProviderKind::Custom => "custom",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ProviderKind::Jan => "Jan",
            ProviderKind::OpenRouter => "OpenRouter",
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::Anthropic => "Anthropic",
            ProviderKind::Gemini => "Google Gemini",
            ProviderKind::Mistral => "Mistral AI",
            ProviderKind::Groq => "Groq",
            ProviderKind::Cohere => "Cohere",
            ProviderKind::Ollama => "Ollama",
            ProviderKind::Replicate => "Replicate",
            ProviderKind::AzureOpenAi => "Azure OpenAI",
            ProviderKind::AwsBedrock => "AWS Bedrock",
            ProviderKind::Perplexity => "Perplexity",
            ProviderKind::TogetherAi => "Together AI",
            ProviderKind::HuggingFace => "Hugging Face",
            ProviderKind::VercelAi => "Vercel AI",
            ProviderKind::DeepInfra => "DeepInfra",
            ProviderKind::Custom => "Custom",
        }
    }

    /// The one vendor whose model listing carries full catalog metadata.
    pub fn has_rich_metadata(self) -> bool {
        matches!(self, ProviderKind::OpenRouter)
    }

    pub fn is_custom(self) -> bool {
        matches!(self, ProviderKind::Custom)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_handles_aliases_and_case() {
        assert_eq!(ProviderKind::parse(" OpenAI "), ProviderKind::OpenAi);
        assert_eq!(ProviderKind::parse("googleai"), ProviderKind::Gemini);
        assert_eq!(ProviderKind::parse("Azure-OpenAI"), ProviderKind::AzureOpenAi);
        assert_eq!(ProviderKind::parse("bedrock"), ProviderKind::AwsBedrock);
        assert_eq!(ProviderKind::parse("vercel"), ProviderKind::VercelAi);
        assert_eq!(ProviderKind::parse("my-llm-box"), ProviderKind::Custom);
    }

    #[test]
    fn canonical_names_parse_back() {
        for kind in ProviderKind::ALL {
            assert_eq!(ProviderKind::parse(kind.as_str()), kind);
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }
}
