use std::sync::Arc;

use lens_extract::{classify, ExtractorSet, ImageClassifier};
use lens_index::{MetadataIndex, MetadataStore, StorageKey};
use lens_resolver::{ContentStore, FsContentStore, ObjectResolver};
use lens_types::{ContentIdentifier, ContentTypeLabel, MetadataRecord};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument, Span};

use crate::config::LensConfig;
use crate::error::{LensError, LensResult};

/// A stored extraction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Extracted {
    pub label: ContentTypeLabel,
    pub key: StorageKey,
}

/// Outcome for one identifier of [`Lens::extract_batch`].
#[derive(Debug)]
pub struct BatchOutcome {
    pub id: ContentIdentifier,
    pub result: LensResult<Extracted>,
}

/// The extraction-and-indexing pipeline.
///
/// resolve -> classify -> extract -> store, with multi-chunk files assembled
/// before classification. Cheap to clone; clones share the content store,
/// classifier and index.
#[derive(Clone)]
pub struct Lens {
    resolver: ObjectResolver,
    extractors: ExtractorSet,
    index: Arc<dyn MetadataIndex>,
    max_depth: usize,
    max_assembled_bytes: u64,
    max_concurrency: usize,
    span: Span,
}

impl Lens {
    pub fn new(
        content_store: Arc<dyn ContentStore>,
        classifier: Arc<dyn ImageClassifier>,
        index: Arc<dyn MetadataIndex>,
        config: &LensConfig,
    ) -> Self {
        Self {
            resolver: ObjectResolver::new(content_store).with_timeout(config.fetch_timeout()),
            extractors: ExtractorSet::new(classifier, &config.extract_config()),
            index,
            max_depth: config.max_depth,
            max_assembled_bytes: config.max_assembled_bytes,
            max_concurrency: config.max_concurrency.max(1),
            span: Span::none(),
        }
    }

    /// Open the block directory and metadata index named by `config`.
    ///
    /// Fails with `StorageLocked` if another handle has the index open.
    pub fn open(config: &LensConfig, classifier: Arc<dyn ImageClassifier>) -> LensResult<Self> {
        let blocks = FsContentStore::open(&config.blocks_path)?;
        let index = MetadataStore::open(&config.datastore_path)?;
        info!(
            datastore = %config.datastore_path.display(),
            blocks = %config.blocks_path.display(),
            "lens opened"
        );
        Ok(Self::new(Arc::new(blocks), classifier, Arc::new(index), config))
    }

    /// Emit all pipeline events inside `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn index(&self) -> &Arc<dyn MetadataIndex> {
        &self.index
    }

    pub fn resolver(&self) -> &ObjectResolver {
        &self.resolver
    }

    /// Resolve, classify and extract `id` without writing anything.
    pub async fn magnify(
        &self,
        id: &ContentIdentifier,
        cancel: &CancellationToken,
    ) -> LensResult<(ContentTypeLabel, MetadataRecord)> {
        self.magnify_inner(id, cancel).instrument(self.span.clone()).await
    }

    /// Extract `id` and store its record, returning the storage key.
    ///
    /// If `cancel` fires at any point before the write, nothing is stored.
    pub async fn extract_and_store(
        &self,
        id: &ContentIdentifier,
        cancel: &CancellationToken,
    ) -> LensResult<StorageKey> {
        let extracted = self.store_inner(id, cancel).instrument(self.span.clone()).await?;
        Ok(extracted.key)
    }

    /// Extract and store every identifier, at most `max_concurrency` at a
    /// time. Outcomes are returned in input order.
    pub async fn extract_batch(
        &self,
        ids: Vec<ContentIdentifier>,
        cancel: &CancellationToken,
    ) -> Vec<BatchOutcome> {
        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        for (slot, id) in ids.iter().copied().enumerate() {
            let lens = self.clone();
            let permits = Arc::clone(&permits);
            let cancel = cancel.clone();
            let task = async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => lens.store_inner(&id, &cancel).await,
                    Err(_) => Err(LensError::Internal("worker pool closed".into())),
                };
                (slot, result)
            };
            tasks.spawn(task.instrument(self.span.clone()));
        }

        let mut results: Vec<Option<LensResult<Extracted>>> = ids.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, result)) => results[slot] = Some(result),
                Err(e) => warn!(parent: &self.span, error = %e, "extraction task failed"),
            }
        }

        ids.into_iter()
            .zip(results)
            .map(|(id, result)| BatchOutcome {
                id,
                result: result.unwrap_or_else(|| {
                    Err(LensError::Internal(format!("extraction task for {id} did not complete")))
                }),
            })
            .collect()
    }

    /// Stored record for `id`.
    pub fn lookup(&self, id: &ContentIdentifier) -> LensResult<MetadataRecord> {
        let _entered = self.span.enter();
        Ok(self.index.get(id)?)
    }

    /// Administrative removal of a stored record.
    pub fn delete(&self, id: &ContentIdentifier) -> LensResult<()> {
        let _entered = self.span.enter();
        self.index.delete(id)?;
        info!(cid = %id, "metadata deleted");
        Ok(())
    }

    /// Release the index.
    pub fn close(&self) -> LensResult<()> {
        Ok(self.index.close()?)
    }

    async fn magnify_inner(
        &self,
        id: &ContentIdentifier,
        cancel: &CancellationToken,
    ) -> LensResult<(ContentTypeLabel, MetadataRecord)> {
        let object = self
            .resolver
            .resolve_file(id, self.max_depth, self.max_assembled_bytes, cancel)
            .await?;
        let label = classify(&object);
        debug!(cid = %id, label = ?label, assembled = object.is_assembled(), "object classified");

        let record = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LensError::Cancelled(*id)),
            result = self.extractors.extract(label, &object) => result?,
        };
        Ok((label, record))
    }

    async fn store_inner(&self, id: &ContentIdentifier, cancel: &CancellationToken) -> LensResult<Extracted> {
        let (label, record) = self.magnify_inner(id, cancel).await?;
        if cancel.is_cancelled() {
            debug!(cid = %id, "cancelled before store");
            return Err(LensError::Cancelled(*id));
        }
        let key = self.index.put(id, record)?;
        info!(cid = %id, label = ?label, "metadata extracted and stored");
        Ok(Extracted { label, key })
    }
}

impl std::fmt::Debug for Lens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lens")
            .field("resolver", &self.resolver)
            .field("max_depth", &self.max_depth)
            .field("max_assembled_bytes", &self.max_assembled_bytes)
            .field("max_concurrency", &self.max_concurrency)
            .field("entries", &self.index.len())
            .finish_non_exhaustive()
    }
}
