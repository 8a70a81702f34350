/// Prompt builders for the three dispatchable roles ("Role
/// Handler"). Kept as pure string assembly with no I/O so they can be unit
/// tested without spinning up an adapter.
pub struct RolePrompts;

impl RolePrompts {
    pub fn planner(title: &str, description: &str) -> String {
        format!(
            r#"You are the Planner for a single task in a multi-agent orchestration system.

## Task
{title}

{description}

## Output Requirements
Produce a short, concrete plan: the concrete steps a Builder should take and
what a Reviewer should check. Do not write code yet.

## Rules
1. Be concise - no essays, just actionable steps
2. Call out any ambiguity explicitly rather than guessing silently
3. If the task looks like it needs to be split into independent sub-tasks,
   say so and propose their titles

Output the plan now."#,
        )
    }

    pub fn builder(title: &str, description: &str, plan_output: Option<&str>, previous_output: Option<&str>) -> String {
        let plan_section = plan_output
            .map(|p| format!("\n## Plan\n{p}\n"))
            .unwrap_or_default();
        let retry_section = previous_output
            .map(|o| format!("\n## Previous Attempt\nThe previous attempt was rejected. Output:\n{o}\n"))
            .unwrap_or_default();

        format!(
            r#"You are the Builder for a single task in a multi-agent orchestration system.

## Task
{title}

{description}
{plan_section}{retry_section}
## Output Requirements
1. Make the necessary changes to complete this task
2. Explain what you did and why it satisfies the task
3. Note anything a Reviewer should double check

## Rules
- Be precise and minimal in your changes
- If you cannot complete the task, explain exactly why rather than guessing

Complete this task now."#,
        )
    }

    pub fn reviewer(title: &str, description: &str, build_output: &str) -> String {
        format!(
            r#"You are the Reviewer for a single task in a multi-agent orchestration system.

## Task Being Reviewed
{title}

{description}

## Build Output
{build_output}

## Your Job
Decide whether the build output actually satisfies the task. Be strict but
fair: reject work that is incomplete, incorrect, or unverifiable, not work
that simply differs in style from what you would have produced.

## Output Format
On the first line, write exactly `ACTION: Approve` or `ACTION: Reject`.
Follow it with your reasoning and, if rejecting, the specific fixes
needed."#,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_prompt_includes_plan_when_present() {
        let prompt = RolePrompts::builder("t", "d", Some("do X then Y"), None);
        assert!(prompt.contains("do X then Y"));
    }

    #[test]
    fn builder_prompt_includes_retry_context_when_present() {
        let prompt = RolePrompts::builder("t", "d", None, Some("rejected output"));
        assert!(prompt.contains("rejected output"));
        assert!(prompt.contains("previous attempt was rejected"));
    }

    #[test]
    fn reviewer_prompt_carries_build_output_verbatim() {
        let prompt = RolePrompts::reviewer("t", "d", "the diff");
        assert!(prompt.contains("the diff"));
    }
}
