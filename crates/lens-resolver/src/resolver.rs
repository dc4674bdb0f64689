use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use lens_types::{ContentIdentifier, HashFunction};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{FetchError, ResolveError, ResolveResult};
use crate::object::{GraphEntry, Node, ResolvedGraph, ResolvedObject};
use crate::store::ContentStore;

/// Default per-fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Default traversal bound for deep resolution and file assembly.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Fetches, verifies and decodes objects from a [`ContentStore`].
///
/// Every fetch is bounded by the configured timeout and aborts as soon as the
/// caller's cancellation token fires.
#[derive(Clone)]
pub struct ObjectResolver {
    store: Arc<dyn ContentStore>,
    timeout: Duration,
}

/// Emission steps between cooperative yields while assembling.
const YIELD_EVERY: usize = 1024;

/// Byte payload and children of one file chunk.
struct Chunk {
    data: Vec<u8>,
    children: Vec<ContentIdentifier>,
}

/// Assembled length and link height of a chunk's subtree.
#[derive(Clone, Copy)]
struct Extent {
    len: u64,
    height: usize,
}

enum Visit {
    Enter(ContentIdentifier, usize),
    Leave(ContentIdentifier),
}

impl ObjectResolver {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self {
            store,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch and verify the block behind `id`.
    async fn fetch_block(
        &self,
        id: &ContentIdentifier,
        cancel: &CancellationToken,
    ) -> ResolveResult<Vec<u8>> {
        // Identity multihashes inline their content.
        if id.hash_function() == HashFunction::Identity {
            return Ok(id.digest().to_vec());
        }
        if cancel.is_cancelled() {
            return Err(ResolveError::Cancelled(*id));
        }

        let fetch = tokio::time::timeout(self.timeout, self.store.fetch(id.digest(), id.hash_function()));
        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(cid = %id, "fetch cancelled");
                return Err(ResolveError::Cancelled(*id));
            }
            result = fetch => match result {
                Ok(Ok(bytes)) => bytes,
                Ok(Err(FetchError::NotFound)) => return Err(ResolveError::NotFound(*id)),
                Ok(Err(FetchError::Transport(detail))) => {
                    return Err(ResolveError::Transport { id: *id, detail })
                }
                Err(_) => {
                    return Err(ResolveError::Transport {
                        id: *id,
                        detail: format!("fetch timed out after {:?}", self.timeout),
                    })
                }
            },
        };

        if !id.hash_function().verify(&bytes, id.digest()) {
            warn!(cid = %id, "block failed digest verification");
            return Err(ResolveError::decode(id, "block does not match its digest"));
        }
        debug!(cid = %id, bytes = bytes.len(), "block fetched");
        Ok(bytes)
    }

    /// Resolve one object. Links are listed, not followed.
    pub async fn resolve(
        &self,
        id: &ContentIdentifier,
        cancel: &CancellationToken,
    ) -> ResolveResult<ResolvedObject> {
        let bytes = self.fetch_block(id, cancel).await?;
        ResolvedObject::decode(*id, bytes)
    }

    /// Breadth-first traversal from `id`, fetching each distinct identifier
    /// once.
    ///
    /// Fails with `DepthExceeded` when unvisited links remain beyond
    /// `max_depth` hops from the root.
    pub async fn resolve_deep(
        &self,
        id: &ContentIdentifier,
        max_depth: usize,
        cancel: &CancellationToken,
    ) -> ResolveResult<ResolvedGraph> {
        let mut visited = HashSet::from([*id]);
        let mut queue = VecDeque::from([(*id, 0usize)]);
        let mut nodes = Vec::new();

        while let Some((current, depth)) = queue.pop_front() {
            let object = self.resolve(&current, cancel).await?;
            for link in object.links() {
                if visited.contains(&link.target) {
                    continue;
                }
                if depth + 1 > max_depth {
                    return Err(ResolveError::DepthExceeded { id: *id, max_depth });
                }
                visited.insert(link.target);
                queue.push_back((link.target, depth + 1));
            }
            nodes.push(GraphEntry { depth, object });
        }

        debug!(cid = %id, nodes = nodes.len(), "deep resolution complete");
        Ok(ResolvedGraph { root: *id, nodes })
    }

    /// Reassemble the bytes of a chunked UnixFS file.
    ///
    /// Chunks are concatenated in link order; a chunk linked more than once
    /// is fetched once and repeated in the output. The first pass fetches
    /// every distinct chunk and sizes its subtree, so depth and byte limits
    /// are enforced before any output is built. The second pass never
    /// descends into a subtree that contributes no bytes.
    pub async fn assemble(
        &self,
        root: &ResolvedObject,
        max_depth: usize,
        max_bytes: u64,
        cancel: &CancellationToken,
    ) -> ResolveResult<Vec<u8>> {
        let root_id = *root.identifier();
        let depth_exceeded = || ResolveError::DepthExceeded {
            id: root_id,
            max_depth,
        };

        let mut chunks: HashMap<ContentIdentifier, Chunk> = HashMap::new();
        let mut extents: HashMap<ContentIdentifier, Extent> = HashMap::new();
        let mut stack: Vec<Visit> = root
            .links()
            .iter()
            .rev()
            .map(|l| Visit::Enter(l.target, 1))
            .collect();

        while let Some(visit) = stack.pop() {
            if cancel.is_cancelled() {
                return Err(ResolveError::Cancelled(root_id));
            }
            match visit {
                Visit::Leave(id) => {
                    let Some(chunk) = chunks.get(&id) else {
                        continue;
                    };
                    let mut extent = Extent {
                        len: chunk.data.len() as u64,
                        height: 0,
                    };
                    for child in &chunk.children {
                        if let Some(sub) = extents.get(child) {
                            extent.len = extent.len.saturating_add(sub.len);
                            extent.height = extent.height.max(sub.height + 1);
                        }
                    }
                    extents.insert(id, extent);
                }
                Visit::Enter(id, depth) => {
                    if let Some(extent) = extents.get(&id) {
                        if depth + extent.height > max_depth {
                            return Err(depth_exceeded());
                        }
                        continue;
                    }
                    if depth > max_depth {
                        return Err(depth_exceeded());
                    }
                    if chunks.contains_key(&id) {
                        return Err(ResolveError::decode(&id, "file chunks form a cycle"));
                    }
                    let chunk = self.fetch_chunk(&id, cancel).await?;
                    stack.push(Visit::Leave(id));
                    stack.extend(chunk.children.iter().rev().map(|c| Visit::Enter(*c, depth + 1)));
                    chunks.insert(id, chunk);
                }
            }
        }

        let total = root.links().iter().fold(root.content().len() as u64, |acc, l| {
            acc.saturating_add(extents.get(&l.target).map_or(0, |e| e.len))
        });
        if total > max_bytes {
            return Err(ResolveError::ContentTooLarge {
                id: root_id,
                limit: max_bytes,
            });
        }

        let mut out = Vec::with_capacity(usize::try_from(total).unwrap_or_default());
        out.extend_from_slice(root.content());
        let mut pending: Vec<ContentIdentifier> = root.links().iter().rev().map(|l| l.target).collect();
        let mut steps = 0usize;
        while let Some(id) = pending.pop() {
            steps += 1;
            if steps % YIELD_EVERY == 0 {
                if cancel.is_cancelled() {
                    return Err(ResolveError::Cancelled(root_id));
                }
                tokio::task::yield_now().await;
            }
            if extents.get(&id).map_or(0, |e| e.len) == 0 {
                continue;
            }
            let Some(chunk) = chunks.get(&id) else {
                continue;
            };
            out.extend_from_slice(&chunk.data);
            pending.extend(chunk.children.iter().rev().copied());
        }

        debug!(cid = %root_id, bytes = out.len(), chunks = chunks.len(), "file assembled");
        Ok(out)
    }

    async fn fetch_chunk(&self, id: &ContentIdentifier, cancel: &CancellationToken) -> ResolveResult<Chunk> {
        let object = self.resolve(id, cancel).await?;
        let children = object.links().iter().map(|l| l.target).collect();
        match object.node() {
            Node::Raw => Ok(Chunk {
                data: object.bytes().to_vec(),
                children,
            }),
            Node::Pb { unixfs: Some(u) } if u.kind.is_file() => Ok(Chunk {
                data: u.data.clone().unwrap_or_default(),
                children,
            }),
            _ => Err(ResolveError::decode(id, "linked node is not a file chunk")),
        }
    }

    /// Resolve `id`, reassembling chunked UnixFS files so that
    /// [`ResolvedObject::content`] yields the whole file.
    pub async fn resolve_file(
        &self,
        id: &ContentIdentifier,
        max_depth: usize,
        max_bytes: u64,
        cancel: &CancellationToken,
    ) -> ResolveResult<ResolvedObject> {
        let object = self.resolve(id, cancel).await?;
        if !object.is_chunked_file() {
            return Ok(object);
        }
        let content = self.assemble(&object, max_depth, max_bytes, cancel).await?;
        Ok(object.with_content(content))
    }
}

impl std::fmt::Debug for ObjectResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectResolver")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dagpb::{PbLink, PbNode, UnixFsData};
    use crate::memory::InMemoryContentStore;
    use crate::unixfs::build_file;
    use async_trait::async_trait;
    use lens_types::Codec;

    fn setup() -> (Arc<InMemoryContentStore>, ObjectResolver) {
        let store = Arc::new(InMemoryContentStore::new());
        let resolver = ObjectResolver::new(store.clone());
        (store, resolver)
    }

    fn json_node(store: &InMemoryContentStore, links: &[(&str, ContentIdentifier)]) -> ContentIdentifier {
        let map: serde_json::Map<String, serde_json::Value> = links
            .iter()
            .map(|(k, id)| (k.to_string(), serde_json::json!({"/": id.to_canonical()})))
            .collect();
        let bytes = serde_json::to_vec(&serde_json::Value::Object(map)).unwrap();
        store.put(Codec::DagJson, HashFunction::Sha2_256, bytes).unwrap()
    }

    fn load(store: &InMemoryContentStore, dag: &crate::unixfs::UnixFsDag) {
        for (id, bytes) in &dag.blocks {
            store.insert(id, bytes.clone());
        }
    }

    /// Never answers.
    struct StalledStore;

    #[async_trait]
    impl ContentStore for StalledStore {
        async fn fetch(&self, _: &[u8], _: HashFunction) -> Result<Vec<u8>, FetchError> {
            std::future::pending().await
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl ContentStore for BrokenStore {
        async fn fetch(&self, _: &[u8], _: HashFunction) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Transport("connection refused".into()))
        }
    }

    fn some_id() -> ContentIdentifier {
        ContentIdentifier::from_content(Codec::Raw, HashFunction::Sha2_256, b"somewhere").unwrap()
    }

    // -----------------------------------------------------------------------
    // resolve
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn resolve_raw_block() {
        let (store, resolver) = setup();
        let id = store.put_raw(b"payload".to_vec()).unwrap();
        let obj = resolver.resolve(&id, &CancellationToken::new()).await.unwrap();
        assert_eq!(obj.bytes(), b"payload");
        assert_eq!(obj.identifier(), &id);
    }

    #[tokio::test]
    async fn repeated_resolve_is_byte_identical() {
        let (store, resolver) = setup();
        let id = store.put_raw(b"stable".to_vec()).unwrap();
        let cancel = CancellationToken::new();
        let a = resolver.resolve(&id, &cancel).await.unwrap();
        let b = resolver.resolve(&id, &cancel).await.unwrap();
        assert_eq!(a.bytes(), b.bytes());
    }

    #[tokio::test]
    async fn identity_hash_skips_the_store() {
        let (store, resolver) = setup();
        let id = ContentIdentifier::from_content(Codec::Raw, HashFunction::Identity, b"inline").unwrap();
        let obj = resolver.resolve(&id, &CancellationToken::new()).await.unwrap();
        assert_eq!(obj.content(), b"inline");
        assert_eq!(store.fetch_count(), 0);
    }

    #[tokio::test]
    async fn missing_block_is_not_found() {
        let (_, resolver) = setup();
        let err = resolver.resolve(&some_id(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(id) if id == some_id()));
    }

    #[tokio::test]
    async fn corrupt_block_is_decode_error() {
        let (store, resolver) = setup();
        store.insert(&some_id(), b"tampered".to_vec());
        let err = resolver.resolve(&some_id(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ResolveError::Decode { .. }));
    }

    #[tokio::test]
    async fn transport_errors_carry_detail() {
        let resolver = ObjectResolver::new(Arc::new(BrokenStore));
        let err = resolver.resolve(&some_id(), &CancellationToken::new()).await.unwrap_err();
        match err {
            ResolveError::Transport { id, detail } => {
                assert_eq!(id, some_id());
                assert!(detail.contains("refused"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn stalled_fetch_times_out() {
        let resolver = ObjectResolver::new(Arc::new(StalledStore)).with_timeout(Duration::from_millis(20));
        let err = resolver.resolve(&some_id(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ResolveError::Transport { ref detail, .. } if detail.contains("timed out")));
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_fetch() {
        let resolver = ObjectResolver::new(Arc::new(StalledStore));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let err = resolver.resolve(&some_id(), &cancel).await.unwrap_err();
        assert!(matches!(err, ResolveError::Cancelled(_)));
    }

    #[tokio::test]
    async fn already_cancelled_token_never_fetches() {
        let (store, resolver) = setup();
        let id = store.put_raw(b"x".to_vec()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            resolver.resolve(&id, &cancel).await,
            Err(ResolveError::Cancelled(_))
        ));
        assert_eq!(store.fetch_count(), 0);
    }

    // -----------------------------------------------------------------------
    // resolve_deep
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn deep_resolution_visits_shared_nodes_once() {
        let (store, resolver) = setup();
        let leaf = store.put_raw(b"leaf".to_vec()).unwrap();
        let a = json_node(&store, &[("leaf", leaf)]);
        let b = json_node(&store, &[("shared", leaf)]);
        let root = json_node(&store, &[("a", a), ("b", b)]);

        let graph = resolver.resolve_deep(&root, 4, &CancellationToken::new()).await.unwrap();
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.identifiers(), vec![root, a, b, leaf]);
        assert_eq!(graph.depth(), 2);
        assert_eq!(store.fetch_count(), 4);
    }

    #[tokio::test]
    async fn deep_resolution_respects_max_depth() {
        let (store, resolver) = setup();
        let leaf = store.put_raw(b"deep".to_vec()).unwrap();
        let mid = json_node(&store, &[("next", leaf)]);
        let root = json_node(&store, &[("next", mid)]);
        let cancel = CancellationToken::new();

        let err = resolver.resolve_deep(&root, 1, &cancel).await.unwrap_err();
        assert!(matches!(err, ResolveError::DepthExceeded { id, max_depth: 1 } if id == root));
        assert_eq!(resolver.resolve_deep(&root, 2, &cancel).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn deep_resolution_propagates_missing_children() {
        let (store, resolver) = setup();
        let root = json_node(&store, &[("gone", some_id())]);
        let err = resolver.resolve_deep(&root, 4, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.identifier(), &some_id());
    }

    // -----------------------------------------------------------------------
    // assemble
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn assembles_chunked_file_in_order() {
        let (store, resolver) = setup();
        let content: Vec<u8> = (0..100u8).collect();
        let dag = build_file(&content, 10, 4).unwrap();
        load(&store, &dag);

        let obj = resolver
            .resolve_file(&dag.root, 8, 1 << 20, &CancellationToken::new())
            .await
            .unwrap();
        assert!(obj.is_assembled());
        assert_eq!(obj.content(), &content[..]);
    }

    #[tokio::test]
    async fn duplicate_chunks_are_fetched_once() {
        let (store, resolver) = setup();
        let content = vec![b'a'; 100];
        let dag = build_file(&content, 10, 4).unwrap();
        load(&store, &dag);

        let cancel = CancellationToken::new();
        let root = resolver.resolve(&dag.root, &cancel).await.unwrap();
        let bytes = resolver.assemble(&root, 8, 1 << 20, &cancel).await.unwrap();
        assert_eq!(bytes, content);
        // root + two distinct parents + one distinct leaf
        assert_eq!(store.fetch_count(), 4);
    }

    #[tokio::test]
    async fn assembly_is_depth_bounded() {
        let (store, resolver) = setup();
        let dag = build_file(&[7u8; 100], 10, 4).unwrap();
        load(&store, &dag);
        let err = resolver
            .resolve_file(&dag.root, 1, 1 << 20, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::DepthExceeded { .. }));
    }

    #[tokio::test]
    async fn assembly_is_size_bounded() {
        let (store, resolver) = setup();
        let dag = build_file(&[7u8; 100], 10, 4).unwrap();
        load(&store, &dag);
        let err = resolver
            .resolve_file(&dag.root, 8, 50, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::ContentTooLarge { limit: 50, .. }));
    }

    #[tokio::test]
    async fn single_node_file_needs_no_assembly() {
        let (store, resolver) = setup();
        let dag = build_file(b"small", 1024, 4).unwrap();
        load(&store, &dag);
        let obj = resolver
            .resolve_file(&dag.root, 8, 1 << 20, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!obj.is_assembled());
        assert_eq!(obj.content(), b"small");
    }

    /// `levels` file nodes stacked on `leaf`, each linking twice to the one below.
    fn doubling_chain(store: &InMemoryContentStore, leaf: ContentIdentifier, levels: usize) -> ContentIdentifier {
        let mut child = leaf;
        for _ in 0..levels {
            let node = PbNode {
                links: vec![PbLink::new(child, None, None), PbLink::new(child, None, None)],
                data: Some(UnixFsData::file(None, 0, vec![0, 0]).encode()),
            };
            child = store.put(Codec::DagPb, HashFunction::Sha2_256, node.encode()).unwrap();
        }
        child
    }

    #[tokio::test]
    async fn shared_empty_subtrees_assemble_without_rewalking() {
        let (store, resolver) = setup();
        let leaf = store.put_raw(Vec::new()).unwrap();
        let root = doubling_chain(&store, leaf, 30);

        let obj = tokio::time::timeout(
            Duration::from_secs(5),
            resolver.resolve_file(&root, 32, 64 << 20, &CancellationToken::new()),
        )
        .await
        .expect("assembly finished")
        .unwrap();
        assert!(obj.content().is_empty());
        assert_eq!(store.fetch_count(), 31);
    }

    #[tokio::test]
    async fn shared_subtrees_are_repeated_in_order() {
        let (store, resolver) = setup();
        let leaf = store.put_raw(b"ab".to_vec()).unwrap();
        let root = doubling_chain(&store, leaf, 10);

        let obj = resolver
            .resolve_file(&root, 16, 1 << 20, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(obj.content(), b"ab".repeat(1 << 10).as_slice());
        assert_eq!(store.fetch_count(), 11);
    }

    #[tokio::test]
    async fn exponential_fan_out_fails_before_building_output() {
        let (store, resolver) = setup();
        let leaf = store.put_raw(b"x".to_vec()).unwrap();
        let root = doubling_chain(&store, leaf, 30);

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            resolver.resolve_file(&root, 32, 64 << 20, &CancellationToken::new()),
        )
        .await
        .expect("assembly finished")
        .unwrap_err();
        assert!(matches!(err, ResolveError::ContentTooLarge { id, .. } if id == root));
    }

    #[tokio::test]
    async fn shared_subtree_depth_is_checked_on_reuse() {
        let (store, resolver) = setup();
        let leaf = store.put_raw(b"x".to_vec()).unwrap();
        let root = doubling_chain(&store, leaf, 6);
        let cancel = CancellationToken::new();

        let err = resolver.resolve_file(&root, 5, 1 << 20, &cancel).await.unwrap_err();
        assert!(matches!(err, ResolveError::DepthExceeded { id, max_depth: 5 } if id == root));
        assert_eq!(resolver.resolve_file(&root, 6, 1 << 20, &cancel).await.unwrap().content().len(), 64);
    }

    #[tokio::test]
    async fn cancelled_assembly_stops() {
        let (store, resolver) = setup();
        let dag = build_file(&[1u8; 100], 10, 4).unwrap();
        load(&store, &dag);
        let cancel = CancellationToken::new();
        let root = resolver.resolve(&dag.root, &cancel).await.unwrap();
        cancel.cancel();

        let err = resolver.assemble(&root, 8, 1 << 20, &cancel).await.unwrap_err();
        assert!(matches!(err, ResolveError::Cancelled(id) if id == dag.root));
        assert_eq!(store.fetch_count(), 1);
    }
}
