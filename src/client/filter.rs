use super::cache::CachedTodo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TodoFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl TodoFilter {
    pub fn matches(self, todo: &CachedTodo) -> bool {
        match self {
            TodoFilter::All => true,
            TodoFilter::Active => !todo.completed,
            TodoFilter::Completed => todo.completed,
        }
    }

    /// Indices into `todos` of the entries this filter keeps, in order.
    pub fn indices(self, todos: &[CachedTodo]) -> Vec<usize> {
        todos.iter().enumerate().filter(|(_, t)| self.matches(t)).map(|(i, _)| i).collect()
    }

    pub fn next(self) -> Self {
        match self {
            TodoFilter::All => TodoFilter::Active,
            TodoFilter::Active => TodoFilter::Completed,
            TodoFilter::Completed => TodoFilter::All,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TodoFilter::All => "All",
            TodoFilter::Active => "Active",
            TodoFilter::Completed => "Completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterCounts {
    pub all: usize,
    pub active: usize,
    pub completed: usize,
}

impl FilterCounts {
    pub fn of(todos: &[CachedTodo]) -> Self {
        let completed = todos.iter().filter(|t| t.completed).count();
        Self { all: todos.len(), active: todos.len() - completed, completed }
    }

    pub fn get(&self, filter: TodoFilter) -> usize {
        match filter {
            TodoFilter::All => self.all,
            TodoFilter::Active => self.active,
            TodoFilter::Completed => self.completed,
        }
    }
}
