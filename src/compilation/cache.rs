//! Compiled pages keyed by template path.
//!
//! The first request for a page starts its compilation on the blocking pool
//! and stores the shared future; every later or concurrent request awaits the
//! same future, so a page compiles at most once per cache entry. Failures are
//! cached too and are only retried after `invalidate`.

use crate::compilation::{
    failure::CompilationError,
    loader::{CompiledPageActionDescriptor, PageLoader},
};
use crate::project::descriptors::PageActionDescriptor;
use futures::future::{BoxFuture, FutureExt, Shared};
use log::debug;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::sync::RwLock;

pub type CompileResult = Result<Arc<CompiledPageActionDescriptor>, CompilationError>;
type PendingCompilation = Shared<BoxFuture<'static, CompileResult>>;

pub struct CompiledPageCache {
    loader: PageLoader,
    entries: RwLock<HashMap<String, PendingCompilation>>,
    compilations: Arc<AtomicUsize>,
}

impl std::fmt::Debug for CompiledPageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledPageCache")
            .field("loader", &self.loader)
            .field("compilations", &self.compilation_count())
            .finish_non_exhaustive()
    }
}

impl CompiledPageCache {
    pub fn new(loader: PageLoader) -> Self {
        Self {
            loader,
            entries: RwLock::new(HashMap::new()),
            compilations: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn loader(&self) -> &PageLoader {
        &self.loader
    }

    /// Number of compilations started since the cache was created.
    pub fn compilation_count(&self) -> usize {
        self.compilations.load(Ordering::SeqCst)
    }

    pub async fn get_or_compile(&self, descriptor: &Arc<PageActionDescriptor>) -> CompileResult {
        let existing = self
            .entries
            .read()
            .await
            .get(&descriptor.relative_path)
            .cloned();
        let pending = match existing {
            Some(pending) => pending,
            None => self
                .entries
                .write()
                .await
                .entry(descriptor.relative_path.clone())
                .or_insert_with(|| self.start(descriptor.clone()))
                .clone(),
        };
        pending.await
    }

    fn start(&self, descriptor: Arc<PageActionDescriptor>) -> PendingCompilation {
        let loader = self.loader.clone();
        let counter = self.compilations.clone();
        let path = descriptor.relative_path.clone();
        debug!("scheduling compilation of {path}");
        let handle = tokio::task::spawn_blocking(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            loader.load(descriptor).map(Arc::new)
        });
        async move {
            match handle.await {
                Ok(result) => result,
                Err(error) => Err(CompilationError::Interrupted {
                    path,
                    message: error.to_string(),
                }),
            }
        }
        .boxed()
        .shared()
    }

    /// Drops the entry for `relative_path`; returns whether one existed.
    pub async fn invalidate(&self, relative_path: &str) -> bool {
        let removed = self.entries.write().await.remove(relative_path).is_some();
        if removed {
            debug!("invalidated {relative_path}");
        }
        removed
    }

    pub async fn invalidate_all(&self) {
        let mut entries = self.entries.write().await;
        debug!("invalidating {} cached pages", entries.len());
        entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compilation::{pipeline::CompilerPipeline, references::DeclaredReferences};
    use crate::project::{item::MemoryProject, options::PagesOptions, RouteTable};

    fn cache(project: MemoryProject) -> (CompiledPageCache, RouteTable) {
        let options = PagesOptions::default();
        let routes = RouteTable::from_project(&project, &options);
        let loader = PageLoader::new(
            Arc::new(CompilerPipeline::new(options)),
            Arc::new(project),
            Arc::new(DeclaredReferences::default()),
        );
        (CompiledPageCache::new(loader), routes)
    }

    #[tokio::test]
    async fn failures_stay_cached_until_invalidated() {
        let mut project = MemoryProject::new();
        project.add("/Pages/Broken.razor", "<p>@missing</p>");
        let (cache, routes) = cache(project);
        let descriptor = routes.find_by_path("/Pages/Broken.razor").expect("route").clone();

        let first = cache.get_or_compile(&descriptor).await.expect_err("unknown name");
        assert!(first.exception().is_some());
        cache.get_or_compile(&descriptor).await.expect_err("still broken");
        assert_eq!(cache.compilation_count(), 1);

        assert!(cache.invalidate("/Pages/Broken.razor").await);
        assert!(!cache.invalidate("/Pages/Broken.razor").await);
        cache.get_or_compile(&descriptor).await.expect_err("recompiled");
        assert_eq!(cache.compilation_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn aborted_waiter_leaves_the_compilation_running() {
        let mut project = MemoryProject::new();
        project.add("/Pages/Index.razor", "<h1>Home</h1>");
        let (cache, routes) = cache(project);
        let cache = Arc::new(cache);
        let descriptor = routes.find_by_path("/Pages/Index.razor").expect("route").clone();

        let waiter = tokio::spawn({
            let cache = cache.clone();
            let descriptor = descriptor.clone();
            async move { cache.get_or_compile(&descriptor).await.is_ok() }
        });
        while !cache.entries.read().await.contains_key("/Pages/Index.razor") {
            tokio::task::yield_now().await;
        }
        waiter.abort();
        let _ = waiter.await;

        let compiled = cache.get_or_compile(&descriptor).await;
        assert!(compiled.is_ok());
        assert_eq!(cache.compilation_count(), 1);
    }

    #[tokio::test]
    async fn missing_item_is_not_found() {
        let mut project = MemoryProject::new();
        project.add("/Pages/Index.razor", "<h1>Home</h1>");
        let (cache, _) = cache(project);
        let ghost = Arc::new(PageActionDescriptor {
            relative_path: "/Pages/Ghost.razor".into(),
            view_engine_path: "/Ghost.razor".into(),
            route_template: "Ghost".into(),
            display_name: "Page: /Ghost.razor".into(),
            filters: Vec::new(),
            route_values: Default::default(),
        });
        let err = cache.get_or_compile(&ghost).await.expect_err("no item");
        assert!(matches!(err, CompilationError::NotFound(path) if path == "/Pages/Ghost.razor"));
        cache.invalidate_all().await;
    }
}
