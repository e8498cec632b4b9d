//! Category-keyed prompt templates.
//!
//! Templates interpolate `{title}`, `{body}`, and `{keywords}`. Unknown
//! categories fall back to the general template.

use std::collections::HashMap;

use serde::Deserialize;

use crate::triage::types::Post;

const GENERAL: &str = "\
You are a helpful assistant responding to a social media post.
Provide a thoughtful, relevant response that adds value to the discussion. \
Keep your response conversational and under 200 words.

Post Title: {title}
Post Content: {body}
Keywords: {keywords}

Response:";

const INDIA_SPECIFIC: &str = "\
You are a helpful assistant responding to a post about India or Indian topics.
Provide a thoughtful, informative, and culturally aware response. Be respectful \
and avoid controversial topics. Keep your response conversational and under 200 words.

Post Title: {title}
Post Content: {body}
Matched Keywords: {keywords}

Response:";

const HELPFUL_ADVICE: &str = "\
You are a helpful assistant responding to someone seeking advice.
Provide practical, supportive advice while being empathetic. Keep your response \
conversational and under 200 words.

Post Title: {title}
Post Content: {body}
Context: {keywords}

Response:";

const TECH_DISCUSSION: &str = "\
You are a knowledgeable assistant responding to a technology-related post.
Provide informative, accurate information while being approachable. Keep your \
response conversational and under 200 words.

Post Title: {title}
Post Content: {body}
Tech Topics: {keywords}

Response:";

/// Optional template overrides loaded alongside the rules file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateOverrides {
    #[serde(default)]
    pub templates: HashMap<String, String>,
}

/// Prompt templates keyed by rule category.
pub struct PromptLibrary {
    templates: HashMap<String, String>,
}

impl PromptLibrary {
    /// The built-in template set.
    pub fn builtin() -> Self {
        let mut templates = HashMap::new();
        templates.insert("general".to_string(), GENERAL.to_string());
        templates.insert("india_specific".to_string(), INDIA_SPECIFIC.to_string());
        templates.insert("helpful_advice".to_string(), HELPFUL_ADVICE.to_string());
        templates.insert("tech_discussion".to_string(), TECH_DISCUSSION.to_string());
        Self { templates }
    }

    /// Built-ins plus config-supplied overrides (overrides win).
    pub fn with_overrides(overrides: TemplateOverrides) -> Self {
        let mut library = Self::builtin();
        library.templates.extend(overrides.templates);
        library
    }

    /// Render the template for `category`, falling back to general.
    pub fn render(&self, category: &str, post: &Post, keywords: &str) -> String {
        let template = self
            .templates
            .get(category)
            .or_else(|| self.templates.get("general"))
            .map(String::as_str)
            .unwrap_or(GENERAL);

        let body = if post.body.trim().is_empty() {
            "No content provided"
        } else {
            post.body.as_str()
        };

        template
            .replace("{title}", &post.title)
            .replace("{body}", body)
            .replace("{keywords}", keywords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_post(title: &str, body: &str) -> Post {
        Post {
            id: "t3_p".into(),
            source: "india".into(),
            title: title.into(),
            body: body.into(),
            author: "a".into(),
            score: 1,
            locked: false,
            deleted: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn renders_known_category() {
        let library = PromptLibrary::builtin();
        let prompt = library.render(
            "tech_discussion",
            &make_post("Rust vs Go?", "Which should I learn first?"),
            "programming",
        );
        assert!(prompt.contains("technology-related"));
        assert!(prompt.contains("Rust vs Go?"));
        assert!(prompt.contains("Which should I learn first?"));
        assert!(prompt.contains("programming"));
    }

    #[test]
    fn unknown_category_falls_back_to_general() {
        let library = PromptLibrary::builtin();
        let prompt = library.render("no_such_category", &make_post("Title", "Body"), "kw");
        assert!(prompt.contains("adds value to the discussion"));
    }

    #[test]
    fn empty_body_gets_placeholder() {
        let library = PromptLibrary::builtin();
        let prompt = library.render("general", &make_post("Just a title", "  "), "kw");
        assert!(prompt.contains("No content provided"));
    }

    #[test]
    fn overrides_replace_builtins() {
        let mut overrides = TemplateOverrides::default();
        overrides.templates.insert(
            "general".into(),
            "Custom: {title} / {keywords}".into(),
        );
        let library = PromptLibrary::with_overrides(overrides);
        let prompt = library.render("general", &make_post("T", "B"), "k1");
        assert_eq!(prompt, "Custom: T / k1");
    }
}
