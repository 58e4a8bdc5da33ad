//! Prompt Text
//!
//! Framing and per-step instructions sent to the model. The tool section of
//! the framing is generated from the session's catalog, so it names exactly
//! the tools the model can call.

use crate::termination::DONE_MARKER;
use crate::tool::ToolRegistry;

/// User turn that opens every reasoning step
pub const STEP_PROMPT: &str = "Think about your next reasoning step to perform the CURRENT_TASK. \
Return just the next step. \
Remember, steps should be very brief. \
If this is the final step, return <DONE>.";

/// Text accompanying a user-supplied image
pub const IMAGE_INTRO: &str = "Here is the image the user provided:";

/// Top-level final request after the loop ends naturally
pub const FINAL_ANSWER_PROMPT: &str = "Complete the <CURRENT_TASK>. Do not return <DONE>. \
Note that the user will only see what you return here. \
None of the steps you have taken will be shown to the user, so ensure you return the final answer. \
Do not use any tools.";

/// Final request after the step budget is exhausted
pub const FORCED_FINAL_PROMPT: &str = "Based on your reasoning so far, provide your final answer to the CURRENT_TASK. \
Make your response complete and self-contained since this will be shown to the user. \
Please provide your final answer based on what you've learned so far. \
Do not return <DONE>, and **you are not allowed to use any tools**. Just respond with your final answer.";

/// System notice appended when the budget trips
pub fn budget_notice(max_steps: u32) -> String {
    format!("Maximum reasoning steps ({max_steps}) reached. ")
}

/// Header introducing one few-shot exemplar chain
pub fn exemplar_header(task: &str) -> String {
    format!("<EXAMPLE_TASK>\n{task}")
}

/// Build the system framing for a task and its catalog
pub fn system_framing(task: &str, tools: &ToolRegistry) -> String {
    let guides = tools.guides();

    let mut text = format!(
        "<CURRENT_TASK>\n{task}\n\n<INSTRUCTIONS>\n\
         Slow down your thinking by breaking complex questions into multiple reasoning steps.\n\
         Each individual reasoning step should be brief.\n"
    );

    if guides.is_empty() {
        text.push_str("You have no tools available; reason without them.\n");
    } else {
        text.push_str("You have access to these tools:\n");
        for (i, (name, guide)) in guides.iter().enumerate() {
            text.push_str(&format!("{}. {}: {}\n", i + 1, name, guide.summary));
        }
        text.push('\n');
        for (_, guide) in &guides {
            if let Some(when) = &guide.when_to_use {
                text.push_str(when);
                text.push('\n');
            }
        }
        for (_, guide) in &guides {
            if let Some(heading) = &guide.guidelines_heading {
                text.push('\n');
                text.push_str(heading);
                text.push('\n');
                for line in &guide.guidelines {
                    text.push_str(&format!("- {line}\n"));
                }
            }
        }
    }

    text.push_str(&format!(
        "\nReturn {DONE_MARKER} after the last step.\n\
         The EXAMPLE_TASK(s) above are examples of how to break complex questions into multiple reasoning steps. \
         Use these examples to guide your own thinking for the CURRENT_TASK."
    ));

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::EchoTool;

    #[test]
    fn test_framing_lists_only_catalogued_tools() {
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool::named("python"));
        tools.register(EchoTool::named("find_datapoint_on_web"));

        let text = system_framing("What is 2+2?", &tools);
        assert!(text.starts_with("<CURRENT_TASK>\nWhat is 2+2?\n\n<INSTRUCTIONS>\n"));
        assert!(text.contains("1. python: "));
        assert!(text.contains("2. find_datapoint_on_web: "));
        assert!(!text.contains("3. "));
        assert!(!text.contains("wolfram"));
        assert!(text.contains("Return <DONE> after the last step."));
    }

    #[test]
    fn test_framing_without_tools() {
        let text = system_framing("task", &ToolRegistry::new());
        assert!(text.contains("no tools available"));
        assert!(!text.contains("You have access to these tools"));
    }

    #[test]
    fn test_budget_notice() {
        assert_eq!(budget_notice(2), "Maximum reasoning steps (2) reached. ");
    }
}
