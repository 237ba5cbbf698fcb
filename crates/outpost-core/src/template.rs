//! Template Renderer - personalizes email subjects and bodies

use outpost_storage::Lead;
use regex::Regex;
use serde_json::Value;

/// Template renderer for personalizing email content
pub struct TemplateRenderer {
    placeholder: Regex,
}

impl TemplateRenderer {
    /// Create a new template renderer
    pub fn new() -> Self {
        Self {
            placeholder: Regex::new(r"\{\{[^}]+\}\}").unwrap(),
        }
    }

    /// Render a template with lead data.
    ///
    /// Standard variables: `{{first_name}}`, `{{last_name}}`, `{{company}}`,
    /// `{{email}}`. Missing fields substitute the empty string, never the
    /// literal placeholder. Custom fields are available as
    /// `{{custom.<key>}}`; any placeholder left after substitution is
    /// stripped.
    pub fn render(&self, template: &str, lead: &Lead) -> String {
        let mut result = template.to_string();

        result = result.replace("{{email}}", &lead.email);
        result = result.replace("{{first_name}}", lead.first_name.as_deref().unwrap_or(""));
        result = result.replace("{{last_name}}", lead.last_name.as_deref().unwrap_or(""));
        result = result.replace("{{company}}", lead.company.as_deref().unwrap_or(""));

        for (key, value) in &lead.custom_fields {
            let placeholder = format!("{{{{custom.{}}}}}", key);
            let value_str = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => value.to_string(),
            };
            result = result.replace(&placeholder, &value_str);
        }

        self.remove_unused_placeholders(&result)
    }

    /// Remove unused placeholder variables
    fn remove_unused_placeholders(&self, content: &str) -> String {
        self.placeholder.replace_all(content, "").to_string()
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use outpost_common::types::LeadStatus;
    use uuid::Uuid;

    fn test_lead() -> Lead {
        Lead {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            lead_list_id: Some(Uuid::new_v4()),
            campaign_id: None,
            email: "ada@analytical.dev".to_string(),
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            company: Some("Analytical Engines".to_string()),
            custom_fields: serde_json::json!({"plan": "premium"})
                .as_object()
                .cloned()
                .unwrap(),
            status: LeadStatus::Active,
            current_step: None,
            first_sent_at: None,
            last_sent_at: None,
            opened_at: None,
            replied_at: None,
            bounced_at: None,
            unsubscribed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_standard_variables() {
        let renderer = TemplateRenderer::new();
        let lead = test_lead();

        let result = renderer.render("Hi {{first_name}} from {{company}}", &lead);
        assert_eq!(result, "Hi Ada from Analytical Engines");

        let result = renderer.render("Contact: {{email}}", &lead);
        assert_eq!(result, "Contact: ada@analytical.dev");
    }

    #[test]
    fn test_render_missing_field_substitutes_empty() {
        let renderer = TemplateRenderer::new();
        let mut lead = test_lead();
        lead.first_name = None;

        let result = renderer.render("Hi {{first_name}}", &lead);
        assert_eq!(result, "Hi ");
    }

    #[test]
    fn test_render_custom_fields() {
        let renderer = TemplateRenderer::new();
        let lead = test_lead();

        let result = renderer.render("Your {{custom.plan}} plan", &lead);
        assert_eq!(result, "Your premium plan");
    }

    #[test]
    fn test_render_strips_unknown_placeholders() {
        let renderer = TemplateRenderer::new();
        let lead = test_lead();

        let result = renderer.render("Hi {{first_name}}, {{unknown_var}} there", &lead);
        assert_eq!(result, "Hi Ada,  there");
    }
}
