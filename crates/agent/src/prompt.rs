use std::fs;
use std::io;
use std::path::Path;

use fleetchat_core::domain::decision::Decision;
use serde_json::Value;

use crate::tools::{ToolDescriptor, ToolRegistry};

pub const ENHANCEMENT_SYSTEM_PROMPT: &str =
    "You structure data into UI components. Return valid JSON.";

const PREAMBLE: &str = "\
You are an intelligent assistant that helps manage a cab system and answers general questions.

## Your Capabilities:
1. **General Conversation**: Answer any general questions naturally
2. **Cab Management**: Use the tools below to manage cabs when needed";

const GUIDANCE: &str = r#"## Response Format:
Always respond with a single JSON object in this structure:

{
  "id": "unique-id",
  "message": "User-facing message",
  "intent": "general|view_data|collect_data|execute_action",
  "tool": "tool_name or null",
  "toolArgs": {"key": "value"} or null,
  "missingFields": ["field1", "field2"] or [],
  "components": [...]
}

## Decision Logic:

### Intent: "general"
- Questions unrelated to cab management
- Set tool=null and answer conversationally

### Intent: "view_data"
- The user wants to see data (list cabs, show a location)
- Set tool to the matching read tool and provide toolArgs when needed
- Leave components empty; results are rendered after the tool runs

### Intent: "collect_data"
- The user wants to add or change something but details are missing
- Set tool=null, list missingFields and provide a form component collecting them

### Intent: "execute_action"
- Every required argument is known
- Set tool and complete toolArgs

## Component Types:
- **text**: display text or results (`value`)
- **form**: groups inputs (`children`, optional `apiConfig`)
- **input**: text input (`label`, `placeholder`, `required`, `validation` with minLength/maxLength/pattern/message)
- **button**: action button (`action`, `variant`)
- **select**, **switch**, **date**: choice, toggle and date inputs
- **table**: tabular data (`columns`, `rows`)
- **map**: a location (`latitude`, `longitude`)
- **list**: a sequence of items

Every component id must be unique within its tree. A required input never has minLength 0.

## Important Rules:
1. **Never invent data** - if the user does not provide a cab_id, ask for it
2. **Context matters** - use the conversation history to resolve references like "it" or "that cab"
3. **Validate before executing** - only use execute_action when every required field is present and valid
4. **Clear messages** - explain what you are doing and what you need"#;

/// Renders the tool section from the registered descriptors.
pub fn render_tool_section<'a>(descriptors: impl IntoIterator<Item = &'a ToolDescriptor>) -> String {
    let mut tools = String::from("## Available Tools:\n");
    let mut rules = String::from("## Validation Rules:\n");

    for descriptor in descriptors {
        let params = if descriptor.params.is_empty() {
            "no params".to_string()
        } else {
            let names: Vec<&str> = descriptor.params.iter().map(|param| param.name).collect();
            format!("params: {}", names.join(", "))
        };
        tools.push_str(&format!("- **{}**: {} ({params})\n", descriptor.name, descriptor.description));

        for param in &descriptor.params {
            let line = format!(
                "- {}.{}: {}{}, {}{}\n",
                descriptor.name,
                param.name,
                param.param_type.type_name(),
                param.param_type.constraint().map(|text| format!(" {text}")).unwrap_or_default(),
                if param.required { "required" } else { "optional" },
                if param.description.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", param.description)
                },
            );
            rules.push_str(&line);
        }
        if !descriptor.requires_any.is_empty() {
            rules.push_str(&format!(
                "- {}: at least one of {}\n",
                descriptor.name,
                descriptor.requires_any.join(", ")
            ));
        }
    }

    format!("{tools}\n{rules}")
}

/// Classification system prompt. `prose` replaces the built-in guidance
/// text; the tool section always comes from the registry.
pub fn build_system_prompt(registry: &ToolRegistry, prose: Option<&str>) -> String {
    let tool_section = render_tool_section(registry.descriptors());
    match prose {
        Some(prose) => format!("{}\n\n{tool_section}", prose.trim_end()),
        None => format!("{PREAMBLE}\n\n{tool_section}\n{GUIDANCE}\n"),
    }
}

pub fn load_prose(path: &Path) -> io::Result<String> {
    fs::read_to_string(path)
}

pub fn enhancement_prompt(tool: &str, tool_result: &Value, decision: &Decision) -> String {
    let decision_json = serde_json::to_string(decision).unwrap_or_else(|_| "{}".to_string());
    format!(
        "Given this tool result, enhance the response with appropriate components.\n\n\
         Tool: {tool}\n\
         Result: {tool_result}\n\n\
         Original decision: {decision_json}\n\n\
         Create an enhanced response with:\n\
         1. Updated message describing the result\n\
         2. Appropriate components to display the data\n\n\
         For listings use a table component with columns.\n\
         For a single location use a map component if coordinates are available.\n\
         For add/update/delete use a text component describing the outcome.\n\n\
         Return the complete enhanced decision JSON."
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fleetchat_core::domain::decision::Decision;
    use serde_json::json;

    use super::{build_system_prompt, enhancement_prompt, render_tool_section};
    use crate::fleet::{register_fleet_tools, FleetClient, FleetOperation};
    use crate::tools::ToolRegistry;

    #[test]
    fn tool_section_lists_params_and_constraints() {
        let descriptors = [FleetOperation::AddCab.descriptor(), FleetOperation::ListCabs.descriptor()];
        let section = render_tool_section(descriptors.iter());

        assert!(section.contains("- **add_cab**: Adds a new cab (params: cab_model_name, cab_reg_name)"));
        assert!(section.contains("- **get_all_cabs**: Fetches all active cabs (no params)"));
        assert!(section.contains("add_cab.cab_reg_name: string 3-20 characters, required"));
    }

    #[test]
    fn custom_prose_keeps_registry_tool_section() {
        let client = FleetClient::from_config(&fleetchat_core::config::AppConfig::default().fleet)
            .expect("client builds");
        let mut registry = ToolRegistry::default();
        register_fleet_tools(&mut registry, Arc::new(client));

        let built_in = build_system_prompt(&registry, None);
        assert!(built_in.contains("### Intent: \"collect_data\""));
        assert!(built_in.contains("update_cab_location.current_lan: float between -180 and 180"));

        let custom = build_system_prompt(&registry, Some("You run a tiny taxi desk.\n"));
        assert!(custom.starts_with("You run a tiny taxi desk.\n\n## Available Tools:"));
        assert!(!custom.contains("Decision Logic"));
    }

    #[test]
    fn enhancement_prompt_embeds_tool_and_result() {
        let prompt = enhancement_prompt(
            "get_all_cabs",
            &json!([{ "cab_id": 1 }]),
            &Decision::general("d-1", "Fetching all cabs"),
        );

        assert!(prompt.contains("Tool: get_all_cabs"));
        assert!(prompt.contains("Result: [{\"cab_id\":1}]"));
        assert!(prompt.contains("Fetching all cabs"));
    }
}
