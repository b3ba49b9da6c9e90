//! Standing directives for agents that can delegate.
//!
//! [`DelegationDirectives`] assembles the pinned messages a delegating agent
//! starts with: who its subordinates are, how handoffs behave, and the exact
//! annotation format to emit.

use crate::delegation::HandoffRequest;

/// Builder for the delegation directives added to a delegating agent.
///
/// Each entry becomes its own pinned directive in the agent's buffer.
///
/// # Example
///
/// ```
/// use handoff_rs::agent::prompt::DelegationDirectives;
///
/// let directives = DelegationDirectives::new(["research", "writer"]).build();
/// assert_eq!(directives[0], "Subagents: research, writer");
/// assert!(directives.last().unwrap().contains("\"handoff\""));
/// ```
pub struct DelegationDirectives {
    names: Vec<String>,
    extra: Vec<String>,
}

impl DelegationDirectives {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            extra: Vec::new(),
        }
    }

    /// Append a custom directive after the built-in ones.
    pub fn with_directive(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.is_empty() {
            self.extra.push(text);
        }
        self
    }

    pub fn build(self) -> Vec<String> {
        let example = HandoffRequest::new("<subagent name>", "<task for the subagent>");
        let mut directives = vec![
            format!("Subagents: {}", self.names.join(", ")),
            "You can hand off to the same subagent several times at once. Each handoff \
             runs as its own task and you keep working while it runs."
                .to_string(),
            "Every turn you receive an update on the subagents you handed off to. \
             Finished work arrives as a message starting with \"Response from <subagent>:\"."
                .to_string(),
            format!(
                "To hand off work, include this annotation anywhere in your reply, once per \
                 task: {}",
                example.to_annotation()
            ),
        ];
        directives.extend(self.extra);
        directives
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegation::extract_handoffs;

    #[test]
    fn lists_subordinates_first() {
        let directives = DelegationDirectives::new(["a", "b"]).build();
        assert_eq!(directives.len(), 4);
        assert_eq!(directives[0], "Subagents: a, b");
    }

    #[test]
    fn format_example_is_a_valid_annotation() {
        let directives = DelegationDirectives::new(["a"]).build();
        let extraction = extract_handoffs(&directives[3]);
        assert_eq!(extraction.handoffs.len(), 1);
        assert_eq!(extraction.handoffs[0].subagent, "<subagent name>");
    }

    #[test]
    fn custom_directives_are_appended() {
        let directives = DelegationDirectives::new(["a"])
            .with_directive("Prefer the cheapest subagent.")
            .with_directive("")
            .build();
        assert_eq!(directives.len(), 5);
        assert_eq!(directives[4], "Prefer the cheapest subagent.");
    }
}
