use crate::domain::task::Task;

/// Tasks whose title or description contains `term`, ignoring case, in
/// collection order. An empty term keeps everything.
pub fn filter<'a>(tasks: &'a [Task], term: &str) -> Vec<&'a Task> {
    let term = term.to_lowercase();
    tasks.iter().filter(|t| matches_term(t, &term)).collect()
}

fn matches_term(task: &Task, lowered_term: &str) -> bool {
    task.title.to_lowercase().contains(lowered_term)
        || task.description.to_lowercase().contains(lowered_term)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn tasks() -> Vec<Task> {
        vec![
            Task::new("Complete project documentation", "Write documentation"),
            Task::new("Fix navigation bug", "Sidebar bug"),
            Task::new("Implement user feedback", "Add feedback form"),
            Task::new("Update dependencies", "Update npm packages"),
        ]
    }

    fn titles<'a>(found: &[&'a Task]) -> Vec<&'a str> {
        found.iter().map(|t| t.title.as_str()).collect()
    }

    #[test]
    fn empty_term_keeps_everything_in_order() {
        let all = tasks();
        let found = filter(&all, "");
        assert_eq!(found.len(), all.len());
        assert!(found.iter().zip(&all).all(|(a, b)| a.id == b.id));
    }

    #[test]
    fn matches_title_or_description_ignoring_case() {
        let all = tasks();
        assert_eq!(titles(&filter(&all, "BUG")), ["Fix navigation bug"]);
        assert_eq!(titles(&filter(&all, "npm")), ["Update dependencies"]);
        assert_eq!(
            titles(&filter(&all, "Docu")),
            ["Complete project documentation"]
        );
        assert_eq!(filter(&all, "e").len(), 4);
    }

    #[test]
    fn no_match_is_empty() {
        assert!(filter(&tasks(), "zebra").is_empty());
        assert!(filter(&[], "anything").is_empty());
    }

    fn arb_task() -> impl Strategy<Value = Task> {
        ("[a-zA-Z ]{0,12}", "[a-zA-Z ]{0,12}").prop_map(|(title, desc)| Task::new(title, desc))
    }

    proptest! {
        #[test]
        fn result_is_ordered_subsequence_of_matches(
            all in prop::collection::vec(arb_task(), 0..16),
            term in "[a-zA-Z]{0,3}",
        ) {
            let found = filter(&all, &term);
            let lowered = term.to_lowercase();

            let expected: Vec<_> = all
                .iter()
                .filter(|t| {
                    t.title.to_lowercase().contains(&lowered)
                        || t.description.to_lowercase().contains(&lowered)
                })
                .map(|t| &t.id)
                .collect();
            let got: Vec<_> = found.iter().map(|t| &t.id).collect();
            prop_assert_eq!(got, expected);
        }

        #[test]
        fn empty_term_is_identity(all in prop::collection::vec(arb_task(), 0..16)) {
            let found = filter(&all, "");
            prop_assert_eq!(found.len(), all.len());
        }
    }
}
