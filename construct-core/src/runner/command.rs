//! Translating actions into environment commands

use crate::model::Action;

/// Produces the next command sent to the environment.
///
/// Receives the previously sent command (the scenario prompt before the first
/// interaction) and the action just decided.
pub trait CommandBuilder: Send + Sync {
    fn next_command(&self, previous: &str, action: &Action) -> String;
}

impl<F> CommandBuilder for F
where
    F: Fn(&str, &Action) -> String + Send + Sync,
{
    fn next_command(&self, previous: &str, action: &Action) -> String {
        self(previous, action)
    }
}

/// The action's canonical command form
pub fn interact_command(_previous: &str, action: &Action) -> String {
    action.to_command()
}

/// Previous prompt followed by the action, for clip-chaining environments
pub fn accumulate_prompt(previous: &str, action: &Action) -> String {
    format!("{}\n\n{}", previous, action.to_command())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interact_command_ignores_history() {
        let action = Action::new("turn").with_parameter("angle", -30);
        assert_eq!(interact_command("anything", &action), "turn angle=-30");
    }

    #[test]
    fn test_accumulate_prompt_chains() {
        let first = accumulate_prompt("walk to the table", &Action::new("move_forward"));
        let second = accumulate_prompt(&first, &Action::new("pick_up").with_raw_text("grab it"));
        assert_eq!(second, "walk to the table\n\nmove_forward\n\ngrab it");
    }
}
