//! Optimistic mutations over the cached todo list.
//!
//! Each mutation runs the same steps: supersede fetches and snapshot the list,
//! apply the change locally, call the server, restore the snapshot on failure,
//! then always refetch so the server's list becomes the visible state again.
//!
//! The local change is applied before the mutation method returns and the
//! remote call is already running on the tokio runtime, so the returned future
//! only needs to be awaited by callers interested in the outcome.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use futures::future::{self, BoxFuture, FutureExt};

use super::cache::{CachedTodo, EntryId, ListKey, QueryCache};
use super::remote::{ClientError, TodoApi};
use crate::domain::todo::{CreateTodo, Todo, TodoId, UpdateTodo};

/// Outcome of a mutation, resolved once it has settled and the list was refetched.
pub type Mutation<T> = BoxFuture<'static, Result<T, ClientError>>;

pub struct Reconciler<A: TodoApi> {
    inner: Arc<Inner<A>>,
}

impl<A: TodoApi> Clone for Reconciler<A> {
    fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

struct Inner<A> {
    api: A,
    cache: Arc<QueryCache>,
    key: ListKey,
}

impl<A: TodoApi> Inner<A> {
    async fn refetch(&self) -> Result<(), ClientError> {
        let generation = self.cache.begin_fetch(self.key);
        let todos = self.api.list().await?;
        self.cache.complete_fetch(self.key, generation, todos.into_iter().map(CachedTodo::from).collect());
        Ok(())
    }
}

impl<A: TodoApi> Reconciler<A> {
    pub fn new(api: A, cache: Arc<QueryCache>) -> Self {
        Self { inner: Arc::new(Inner { api, cache, key: ListKey::TODOS }) }
    }

    pub fn cache(&self) -> &Arc<QueryCache> { &self.inner.cache }

    /// What the UI should render right now.
    pub fn todos(&self) -> Vec<CachedTodo> { self.inner.cache.get(self.inner.key) }

    /// Fetches the list; the result is dropped if a mutation or newer fetch started meanwhile.
    pub async fn refetch(&self) -> Result<(), ClientError> { self.inner.refetch().await }

    pub fn create(&self, input: CreateTodo) -> Mutation<Todo> {
        let now = Utc::now();
        let optimistic = CachedTodo {
            id: self.inner.cache.next_pending_id(),
            title: input.title.clone(),
            description: input.description.clone(),
            completed: false,
            created_at: now,
            updated_at: now,
        };
        self.run(
            move |list| list.insert(0, optimistic),
            move |inner| async move { inner.api.create(input).await },
        )
    }

    pub fn update(&self, id: TodoId, input: UpdateTodo) -> Mutation<Todo> {
        let patch = input.clone();
        self.run(
            move |list| {
                let now = Utc::now();
                for todo in list.iter_mut().filter(|t| t.id == EntryId::Saved(id)) {
                    if let Some(title) = &patch.title { todo.title = title.clone(); }
                    if let Some(description) = &patch.description { todo.description = description.clone(); }
                    if let Some(completed) = patch.completed { todo.completed = completed; }
                    todo.updated_at = now;
                }
            },
            move |inner| async move { inner.api.update(id, input).await },
        )
    }

    /// Flips `completed` as currently shown; sent as an ordinary update.
    pub fn toggle(&self, id: TodoId) -> Mutation<Todo> {
        let current = self.todos().into_iter().find(|t| t.id == EntryId::Saved(id)).map(|t| t.completed);
        match current {
            Some(completed) => self.update(id, UpdateTodo::toggle(!completed)),
            None => future::ready(Err(ClientError::NotFound)).boxed(),
        }
    }

    pub fn delete(&self, id: TodoId) -> Mutation<()> {
        self.run(
            move |list| list.retain(|t| t.id != EntryId::Saved(id)),
            move |inner| async move { inner.api.delete(id).await },
        )
    }

    fn run<T, F, Fut>(&self, apply: impl FnOnce(&mut Vec<CachedTodo>), call: F) -> Mutation<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Inner<A>>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ClientError>> + Send + 'static,
    {
        let inner = self.inner.clone();
        inner.cache.begin_mutation(inner.key, apply);

        let task = tokio::spawn(async move {
            let result = call(inner.clone()).await;
            if let Err(e) = &result {
                tracing::warn!(error = %e, "mutation failed, rolling back");
                inner.cache.roll_back(inner.key);
            }
            inner.cache.settle(inner.key);
            if let Err(e) = inner.refetch().await {
                tracing::warn!(error = %e, "refetch after mutation failed");
            }
            result
        });

        async move { task.await.unwrap_or_else(|e| Err(ClientError::Interrupted(e.to_string()))) }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user::UserId;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Semaphore;

    /// Server stand-in. Mutations wait for a permit on `gate` so tests can
    /// inspect the optimistic state before the response arrives.
    struct FakeApi {
        owner: UserId,
        server: Mutex<Vec<Todo>>,
        gate: Semaphore,
        list_gate: Option<Semaphore>,
        fail_mutations: AtomicBool,
        fail_list: AtomicBool,
    }

    impl FakeApi {
        fn new(todos: Vec<Todo>) -> Self {
            Self {
                owner: UserId(uuid::Uuid::new_v4()),
                server: Mutex::new(todos),
                gate: Semaphore::new(0),
                list_gate: None,
                fail_mutations: AtomicBool::new(false),
                fail_list: AtomicBool::new(false),
            }
        }

        async fn pass_gate(&self) -> Result<(), ClientError> {
            self.gate.acquire().await.map_err(|e| ClientError::Interrupted(e.to_string()))?.forget();
            if self.fail_mutations.load(Ordering::SeqCst) {
                return Err(ClientError::Server { status: 500, message: "Failed".into() });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl TodoApi for Arc<FakeApi> {
        async fn list(&self) -> Result<Vec<Todo>, ClientError> {
            if let Some(gate) = &self.list_gate {
                gate.acquire().await.map_err(|e| ClientError::Interrupted(e.to_string()))?.forget();
            }
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(ClientError::Server { status: 500, message: "Failed".into() });
            }
            Ok(self.server.lock().unwrap().clone())
        }

        async fn create(&self, input: CreateTodo) -> Result<Todo, ClientError> {
            self.pass_gate().await?;
            if input.title.chars().count() < 3 {
                return Err(ClientError::Validation(None));
            }
            let now = Utc::now();
            let todo = Todo { id: TodoId::default(), user_id: self.owner, title: input.title, description: input.description, completed: false, created_at: now, updated_at: now };
            self.server.lock().unwrap().insert(0, todo.clone());
            Ok(todo)
        }

        async fn update(&self, id: TodoId, input: UpdateTodo) -> Result<Todo, ClientError> {
            self.pass_gate().await?;
            let mut server = self.server.lock().unwrap();
            let todo = server.iter_mut().find(|t| t.id == id).ok_or(ClientError::NotFound)?;
            if let Some(t) = input.title { todo.title = t; }
            if let Some(d) = input.description { todo.description = d; }
            if let Some(c) = input.completed { todo.completed = c; }
            todo.updated_at = Utc::now();
            Ok(todo.clone())
        }

        async fn delete(&self, id: TodoId) -> Result<(), ClientError> {
            self.pass_gate().await?;
            let mut server = self.server.lock().unwrap();
            let before = server.len();
            server.retain(|t| t.id != id);
            if server.len() == before { Err(ClientError::NotFound) } else { Ok(()) }
        }
    }

    fn todo(title: &str) -> Todo {
        let now = Utc::now();
        Todo { id: TodoId::default(), user_id: UserId(uuid::Uuid::nil()), title: title.into(), description: None, completed: false, created_at: now, updated_at: now }
    }

    async fn loaded(api: FakeApi) -> (Arc<FakeApi>, Reconciler<Arc<FakeApi>>) {
        let api = Arc::new(api);
        let reconciler = Reconciler::new(api.clone(), Arc::new(QueryCache::new()));
        reconciler.refetch().await.unwrap();
        (api, reconciler)
    }

    fn titles(reconciler: &Reconciler<Arc<FakeApi>>) -> Vec<String> {
        reconciler.todos().into_iter().map(|t| t.title).collect()
    }

    #[tokio::test]
    async fn failed_delete_restores_the_exact_list() {
        let (t1, t2) = (todo("T1"), todo("T2"));
        let (api, reconciler) = loaded(FakeApi::new(vec![t1.clone(), t2.clone()])).await;
        let before = reconciler.todos();

        let pending = reconciler.delete(t1.id);
        assert_eq!(titles(&reconciler), vec!["T2"]);

        // The refetch after settling fails too, so only the rollback can restore the list.
        api.fail_mutations.store(true, Ordering::SeqCst);
        api.fail_list.store(true, Ordering::SeqCst);
        api.gate.add_permits(1);
        assert!(pending.await.is_err());

        assert_eq!(reconciler.todos(), before);
        assert!(!reconciler.cache().has_pending_rollback(ListKey::TODOS));
        assert!(reconciler.cache().is_stale(ListKey::TODOS));
    }

    #[tokio::test]
    async fn successful_create_is_replaced_by_the_server_entry() {
        let (api, reconciler) = loaded(FakeApi::new(vec![todo("Existing")])).await;

        let pending = reconciler.create(CreateTodo { title: "Buy milk".into(), description: None });
        let optimistic = reconciler.todos();
        assert_eq!(optimistic.len(), 2);
        assert!(optimistic[0].is_pending());
        assert_eq!(optimistic[0].title, "Buy milk");
        assert!(!optimistic[0].completed);

        api.gate.add_permits(1);
        let created = pending.await.unwrap();

        let settled = reconciler.todos();
        assert_eq!(settled.len(), 2);
        assert_eq!(settled[0].id, EntryId::Saved(created.id));
        assert_eq!(settled[0].created_at, created.created_at);
        assert!(settled.iter().all(|t| !t.is_pending()));
        assert_eq!(settled.iter().filter(|t| t.title == "Buy milk").count(), 1);
        assert!(!reconciler.cache().is_stale(ListKey::TODOS));
    }

    #[tokio::test]
    async fn rejected_create_leaves_no_trace() {
        let (api, reconciler) = loaded(FakeApi::new(vec![todo("Existing")])).await;
        let before = reconciler.todos();

        let pending = reconciler.create(CreateTodo { title: "ab".into(), description: None });
        assert_eq!(reconciler.todos().len(), 2);

        api.gate.add_permits(1);
        assert!(matches!(pending.await, Err(ClientError::Validation(_))));
        assert_eq!(reconciler.todos(), before);
        assert_eq!(api.server.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn toggle_shows_immediately_and_settles_to_server_state() {
        let t1 = todo("Walk the dog");
        let (api, reconciler) = loaded(FakeApi::new(vec![t1.clone()])).await;

        let pending = reconciler.toggle(t1.id);
        let shown = &reconciler.todos()[0];
        assert!(shown.completed);
        assert!(shown.updated_at >= t1.updated_at);

        api.gate.add_permits(1);
        let updated = pending.await.unwrap();
        assert!(updated.completed);
        assert_eq!(reconciler.todos(), vec![CachedTodo::from(updated)]);
    }

    #[tokio::test]
    async fn update_touches_only_the_matching_entry() {
        let (t1, t2) = (todo("first"), todo("second"));
        let (api, reconciler) = loaded(FakeApi::new(vec![t1.clone(), t2.clone()])).await;

        let patch = UpdateTodo { title: Some("first, renamed".into()), description: Some(Some("notes".into())), completed: None };
        let pending = reconciler.update(t1.id, patch);
        let shown = reconciler.todos();
        assert_eq!(shown[0].title, "first, renamed");
        assert_eq!(shown[0].description.as_deref(), Some("notes"));
        assert_eq!(shown[1], CachedTodo::from(t2));

        api.gate.add_permits(1);
        pending.await.unwrap();
        assert_eq!(titles(&reconciler), vec!["first, renamed", "second"]);
    }

    #[tokio::test]
    async fn toggling_an_unknown_id_fails_without_touching_the_cache() {
        let (_api, reconciler) = loaded(FakeApi::new(vec![todo("only")])).await;
        let before = reconciler.todos();
        assert!(matches!(reconciler.toggle(TodoId::default()).await, Err(ClientError::NotFound)));
        assert_eq!(reconciler.todos(), before);
        assert!(!reconciler.cache().has_pending_rollback(ListKey::TODOS));
    }

    #[tokio::test]
    async fn overlapping_failures_roll_back_to_the_first_snapshot() {
        let (t1, t2, t3) = (todo("T1"), todo("T2"), todo("T3"));
        let (api, reconciler) = loaded(FakeApi::new(vec![t1.clone(), t2.clone(), t3.clone()])).await;
        let before = reconciler.todos();

        let first = reconciler.delete(t1.id);
        let second = reconciler.delete(t2.id);
        assert_eq!(titles(&reconciler), vec!["T3"]);

        api.fail_mutations.store(true, Ordering::SeqCst);
        api.fail_list.store(true, Ordering::SeqCst);
        api.gate.add_permits(2);
        assert!(first.await.is_err());
        assert!(second.await.is_err());

        assert_eq!(reconciler.todos(), before);
    }

    #[tokio::test]
    async fn superseded_fetch_response_is_ignored() {
        let t1 = todo("T1");
        let api = Arc::new(FakeApi { list_gate: Some(Semaphore::new(1)), ..FakeApi::new(vec![t1.clone()]) });
        let reconciler = Reconciler::new(api.clone(), Arc::new(QueryCache::new()));
        reconciler.refetch().await.unwrap();

        // A fetch is in flight, waiting on the list gate.
        let slow = tokio::spawn({
            let reconciler = reconciler.clone();
            async move { reconciler.refetch().await }
        });
        tokio::task::yield_now().await;

        // The delete supersedes it; the server answer the slow fetch carries still has T1.
        let pending = reconciler.delete(t1.id);
        api.list_gate.as_ref().unwrap().add_permits(1);
        slow.await.unwrap().unwrap();
        assert!(reconciler.todos().is_empty());

        api.gate.add_permits(1);
        api.list_gate.as_ref().unwrap().add_permits(1);
        pending.await.unwrap();
        assert!(reconciler.todos().is_empty());
        assert!(api.server.lock().unwrap().is_empty());
    }
}
