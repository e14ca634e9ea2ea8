//! System prompts and the prompt-generator model table.

use super::ProviderKind;

/// Conversation domain chosen by the client; selects the system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Domain {
    #[default]
    General,
    Coding,
    Finance,
}

static DOMAINS: [(Domain, &str, &str); 3] = [
    (Domain::General, "general", "You are a helpful assistant."),
    (
        Domain::Coding,
        "coding",
        "You are a senior software architect with deep expertise in Next.js, full-stack React \
         applications, and database optimizations. Provide clean, efficient code and architectural \
         insights.",
    ),
    (
        Domain::Finance,
        "finance",
        "You are a quantitative analyst, capable of discussing stock market trends, investment \
         strategies, and algorithmic logic for finance systems. Maintain a professional, analytical \
         tone.",
    ),
];

impl Domain {
    /// Parses the request's `domain` field. Absent or unrecognised values
    /// mean [`Domain::General`].
    pub fn from_tag(tag: Option<&str>) -> Self {
        let Some(tag) = tag.map(str::trim) else {
            return Self::General;
        };
        DOMAINS
            .iter()
            .find(|(_, name, _)| name.eq_ignore_ascii_case(tag))
            .map(|(domain, _, _)| *domain)
            .unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        self.entry().1
    }

    pub fn system_prompt(self) -> &'static str {
        self.entry().2
    }

    fn entry(self) -> &'static (Domain, &'static str, &'static str) {
        match self {
            Domain::General => &DOMAINS[0],
            Domain::Coding => &DOMAINS[1],
            Domain::Finance => &DOMAINS[2],
        }
    }
}

/// Model used to expand a short idea into a full prompt.
pub fn generator_model(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Groq => "llama-3.3-70b-versatile",
        ProviderKind::HuggingFace => "meta-llama/Meta-Llama-3-8B-Instruct",
    }
}

/// Instructions for the prompt generator.
pub const PROMPT_ENGINEER_PROMPT: &str = "\
You are an elite AI Prompt Engineer. Your single purpose is to take a user's short idea and expand it into a comprehensive system prompt to instruct another AI.
Your output must ALWAYS include:

Role: Assign a specific expert persona.
Objective: Clearly define the primary goal.
Requirements: Break down specific features or technical constraints.
Formatting: Instruct the AI on how to present its response.

CRITICAL INSTRUCTIONS:
Output ONLY the generated prompt. No conversational filler.
Use markdown formatting.

=== EXAMPLE ===
USER INPUT: build a transit app for winnipeg called Wpass

GENERATED PROMPT:
Role: Act as a Senior Mobile App Developer and UX Designer.

Objective: Write a detailed technical specification and PRD for Wpass, a mobile application for Winnipeg Transit.

Requirements:
1. The application must include real-time bus tracking via API polling.
2. Include architecture for a secure digital payment system for bus passes.
3. Recommend a cross-platform tech stack (e.g., React Native).

Formatting: Present your response using clear markdown headings and bullet points.
=== END EXAMPLE ===";
