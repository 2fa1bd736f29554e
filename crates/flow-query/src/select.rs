use std::cmp::Ordering;

use flow_core::{
    filter::{LabelMatch, ProjectFilter, SortDirection, SortField, TaskFilter, TaskSort},
    tasks::Task,
};
use tracing::trace;

/// Narrow `tasks` to those `filter` admits (and that contain `search_text`,
/// when given), then order them by `sort`.
///
/// The sort is stable in both directions: tasks that compare equal keep
/// their input order, so repeated renders never shuffle ties.
pub fn filter_and_sort<'a>(
    tasks: &'a [Task],
    filter: &TaskFilter,
    sort: &TaskSort,
    search_text: Option<&str>,
) -> Vec<&'a Task> {
    let needles = Needles::new(filter.search.as_deref(), search_text);
    let mut selected: Vec<&Task> = tasks
        .iter()
        .filter(|task| admits(filter, task) && needles.matches(task))
        .collect();

    selected.sort_by(|a, b| compare(a, b, sort));
    trace!(
        total = tasks.len(),
        selected = selected.len(),
        field = %sort.field,
        "filtered task view"
    );
    selected
}

/// Structured part of the filter, without free-text search.
pub fn admits(filter: &TaskFilter, task: &Task) -> bool {
    if !filter.status.is_empty() && !filter.status.contains(&task.status) {
        return false;
    }
    if !filter.priority.is_empty() && !filter.priority.contains(&task.priority) {
        return false;
    }
    match &filter.project {
        ProjectFilter::Any => {}
        ProjectFilter::Is(id) => {
            if task.project_id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        ProjectFilter::Unassigned => {
            if task.project_id.is_some() {
                return false;
            }
        }
    }
    if !filter.labels.is_empty() {
        let carries = |label: &String| task.labels.contains(label);
        let ok = match filter.label_match {
            LabelMatch::Any => filter.labels.iter().any(carries),
            LabelMatch::All => filter.labels.iter().all(carries),
        };
        if !ok {
            return false;
        }
    }
    if !filter.assignee_ids.is_empty()
        && !task
            .assignee_ids
            .iter()
            .any(|id| filter.assignee_ids.contains(id))
    {
        return false;
    }
    if !filter.show_completed && task.is_done() {
        return false;
    }
    if !filter.show_archived && task.is_archived {
        return false;
    }
    if let Some(range) = &filter.due {
        match task.due_date {
            Some(due) if range.contains(due) => {}
            _ => return false,
        }
    }
    true
}

/// Lower-cased search terms; every one must occur in the title or description.
struct Needles(Vec<String>);

impl Needles {
    fn new(filter_search: Option<&str>, search_text: Option<&str>) -> Self {
        Self(
            [filter_search, search_text]
                .into_iter()
                .flatten()
                .filter(|text| !text.is_empty())
                .map(str::to_lowercase)
                .collect(),
        )
    }

    fn matches(&self, task: &Task) -> bool {
        if self.0.is_empty() {
            return true;
        }
        let title = task.title.to_lowercase();
        let description = task.description.as_deref().map(str::to_lowercase);
        self.0.iter().all(|needle| {
            title.contains(needle.as_str())
                || description
                    .as_deref()
                    .is_some_and(|d| d.contains(needle.as_str()))
        })
    }
}

/// Comparator for `sort`, direction applied.
pub fn compare(a: &Task, b: &Task, sort: &TaskSort) -> Ordering {
    let ordering = compare_on_field(a, b, sort.field);
    match sort.direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

fn compare_on_field(a: &Task, b: &Task, field: SortField) -> Ordering {
    match field {
        SortField::DueDate => cmp_missing_last(a.due_date.as_ref(), b.due_date.as_ref()),
        SortField::Priority => a.priority.rank().cmp(&b.priority.rank()),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::Title => compare_titles(&a.title, &b.title),
        SortField::Status => a.status.rank().cmp(&b.status.rank()),
        SortField::Position => a.position.cmp(&b.position),
    }
}

/// Absent values behave like +infinity.
fn cmp_missing_last<T: Ord>(left: Option<&T>, right: Option<&T>) -> Ordering {
    match (left, right) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Case-folded comparison first, so "apple" and "Banana" order the way a
/// reader expects; the raw text only breaks case-only ties.
pub fn compare_titles(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}
