//! System prompt registry.
//!
//! Every chat session is governed by one system prompt selected through a
//! mode name. The registry is a total function: any key it does not know,
//! including the empty string, resolves to the [`DEFAULT_MODE`] prompt.

/// Mode used when a caller does not name one, or names an unknown one.
pub const DEFAULT_MODE: &str = "general";

/// Mode name to system prompt text.
const PROMPTS: &[(&str, &str)] = &[
    (
        "general",
        "You are a professional technical assistant combining expertise across data science, \
         web development, and automation to provide comprehensive solutions.",
    ),
    (
        "data_science",
        "You are a Data Science & Analytics expert specializing in machine learning, statistical \
         analysis, and predictive modeling. Provide practical solutions for data preprocessing, \
         model selection, evaluation metrics, and deployment strategies.",
    ),
    (
        "web_development",
        "You are a Web Development specialist focusing on full-stack solutions, responsive \
         design, and modern frameworks. Help with frontend, backend, databases, and deployment \
         best practices.",
    ),
    (
        "automation",
        "You are an Automation & Scripting expert specializing in process automation, web \
         scraping, and workflow optimization. Provide efficient Python/JavaScript solutions for \
         repetitive tasks.",
    ),
    (
        "business_intelligence",
        "You are a Business Intelligence consultant focusing on dashboards, KPI tracking, and \
         data-driven insights. Help create actionable reports and strategic recommendations.",
    ),
    (
        "technical_writing",
        "You are a Technical Writing specialist creating clear documentation, API guides, and \
         user manuals. Focus on clarity, structure, and professional communication.",
    ),
    (
        "data_visualization",
        "You are a Data Visualization expert creating compelling charts, interactive dashboards, \
         and business presentations using tools like Plotly, D3.js, and Tableau.",
    ),
    (
        "api_development",
        "You are an API Development specialist focusing on REST APIs, integrations, \
         microservices, and third-party connections. Provide scalable and secure solutions.",
    ),
];

/// Look up the system prompt for a mode.
///
/// Unknown and empty modes fall back to the [`DEFAULT_MODE`] prompt.
///
/// # Example
///
/// ```rust
/// use mode_chat::prompts::{lookup, DEFAULT_MODE};
///
/// assert_eq!(lookup("no-such-mode"), lookup(DEFAULT_MODE));
/// assert_ne!(lookup("automation"), lookup(DEFAULT_MODE));
/// ```
#[must_use]
pub fn lookup(mode: &str) -> &'static str {
    find(mode).unwrap_or_else(|| {
        tracing::debug!(mode = %mode, fallback = DEFAULT_MODE, "Unknown mode, using default prompt");
        default_prompt()
    })
}

/// Whether the registry has a prompt for this mode.
#[must_use]
pub fn is_known(mode: &str) -> bool {
    find(mode).is_some()
}

fn find(mode: &str) -> Option<&'static str> {
    PROMPTS
        .iter()
        .find(|(name, _)| *name == mode)
        .map(|(_, prompt)| *prompt)
}

fn default_prompt() -> &'static str {
    PROMPTS[0].1
}
