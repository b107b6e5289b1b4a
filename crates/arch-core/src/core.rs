use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::EditorConfig;
use crate::error::{ArchError, Result};
use crate::history::{ArchHistory, ChangeBatch, ChangeObserver};
use crate::markup::parse_markup;
use crate::mutation::{Batch, MergeDirection};
use crate::node::{ArchId, ArchJson, NodeSnapshot};
use crate::range::{self, ArchPoint, ArchRange, SurfaceMap, SurfaceSelection};
use crate::registry::ArchRegistry;
use crate::rules;
use crate::tree::{ArchTree, ExportOptions};
use crate::value::ArchValue;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Notify {
    #[default]
    Emit,
    Suppress,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOptions {
    pub notify: Notify,
    /// Skip editability and unbreakability checks.
    pub bypass: bool,
}

impl BatchOptions {
    pub fn bypass() -> Self {
        Self {
            bypass: true,
            ..Self::default()
        }
    }

    pub fn silent() -> Self {
        Self {
            notify: Notify::Suppress,
            ..Self::default()
        }
    }
}

/// One editing session: a tree, its range, its history and the observers
/// that hear about committed batches.
pub struct Editor {
    tree: ArchTree,
    range: ArchRange,
    registry: Arc<ArchRegistry>,
    config: EditorConfig,
    history: ArchHistory,
    observers: Vec<Box<dyn ChangeObserver>>,
}

impl Editor {
    /// An empty document: a single paragraph.
    pub fn new(registry: ArchRegistry, config: EditorConfig) -> Result<Self> {
        Self::from_json(&ArchJson::fragment(Vec::new()), registry, config)
    }

    /// An empty document with the core registry and default config.
    pub fn with_core() -> Result<Self> {
        Self::new(ArchRegistry::core(), EditorConfig::default())
    }

    pub fn from_json(json: &ArchJson, registry: ArchRegistry, config: EditorConfig) -> Result<Self> {
        let registry = Arc::new(registry);
        let mut tree = ArchTree::new(registry.clone());
        let root = tree.root();
        for id in tree.build(json)? {
            tree.append_child(root, id)?;
        }
        Self::init(tree, registry, config.with_defaults())
    }

    pub fn from_markup(markup: &str, registry: ArchRegistry, config: EditorConfig) -> Result<Self> {
        let json = parse_markup(&registry, markup);
        Self::from_json(&json, registry, config)
    }

    pub fn from_value(value: &ArchValue, registry: ArchRegistry, config: EditorConfig) -> Result<Self> {
        Self::from_json(&value.root, registry, config)
    }

    fn init(mut tree: ArchTree, registry: Arc<ArchRegistry>, config: EditorConfig) -> Result<Self> {
        rules::normalize(&mut tree, config.max_normalize_iterations)?;
        tree.take_dirty();
        let range = ArchRange::collapsed(range::first_caret(&tree));
        let history = ArchHistory::new(
            tree.root(),
            tree.snapshot_all(),
            range,
            config.coalesce.clone(),
            config.max_undo,
        );
        Ok(Self {
            tree,
            range,
            registry,
            config,
            history,
            observers: Vec::new(),
        })
    }

    pub fn tree(&self) -> &ArchTree {
        &self.tree
    }

    pub fn registry(&self) -> &ArchRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn history(&self) -> &ArchHistory {
        &self.history
    }

    pub fn range(&self) -> ArchRange {
        self.range
    }

    /// Re-validates the range against the live tree before storing it.
    pub fn set_range(&mut self, range: ArchRange) {
        self.range = range::resolve_range(&self.tree, range);
        self.history.update_range(self.range);
    }

    pub fn set_range_from_surface<M: SurfaceMap>(
        &mut self,
        map: &M,
        selection: &SurfaceSelection<M::Node>,
    ) -> bool {
        match ArchRange::from_surface(&self.tree, map, selection) {
            Some(range) => {
                self.set_range(range);
                true
            }
            None => false,
        }
    }

    pub fn range_to_surface<M: SurfaceMap>(&self, map: &M) -> Option<SurfaceSelection<M::Node>> {
        self.range.to_surface(&self.tree, map)
    }

    pub fn subscribe(&mut self, observer: Box<dyn ChangeObserver>) {
        self.observers.push(observer);
    }

    /// Runs `f` as one batch: normalizes afterwards, then notifies history
    /// and observers. A refused edit is rolled back and yields `Ok(None)`;
    /// any other error is rolled back and returned.
    pub fn batch<R>(
        &mut self,
        options: BatchOptions,
        f: impl FnOnce(&mut Batch<'_>) -> Result<R>,
    ) -> Result<Option<R>> {
        let backup = (self.tree.clone(), self.range);
        let result = {
            let mut batch = Batch::new(&mut self.tree, &mut self.range, &self.config, options.bypass);
            f(&mut batch)
        };
        let value = match result {
            Ok(value) => value,
            Err(err) => {
                (self.tree, self.range) = backup;
                if err.is_refusal() {
                    tracing::warn!(%err, "edit refused");
                    return Ok(None);
                }
                return Err(err);
            }
        };
        if let Err(err) = self.commit(options.notify) {
            (self.tree, self.range) = backup;
            return Err(err);
        }
        Ok(Some(value))
    }

    fn commit(&mut self, notify: Notify) -> Result<()> {
        self.tree.collect_unreachable();
        rules::normalize(&mut self.tree, self.config.max_normalize_iterations)?;
        self.range = range::resolve_range(&self.tree, self.range);
        self.tree.prune_tombstones(self.config.max_tombstones);
        let dirty = self.tree.take_dirty();
        if notify == Notify::Suppress {
            return Ok(());
        }
        let states: Vec<NodeSnapshot> = dirty
            .into_iter()
            .filter_map(|id| self.tree.snapshot(id))
            .collect();
        if states.is_empty() {
            self.history.update_range(self.range);
            return Ok(());
        }
        let change = ChangeBatch {
            states,
            range: self.range,
        };
        self.history.record(&change);
        for observer in &mut self.observers {
            observer.on_change(&change);
        }
        Ok(())
    }

    /// Applies flat node states, then re-normalizes.
    pub fn import_update(
        &mut self,
        states: &[NodeSnapshot],
        range: Option<ArchRange>,
        notify: Notify,
    ) -> Result<()> {
        let backup = (self.tree.clone(), self.range);
        let result = self.tree.import_snapshots(states).and_then(|()| {
            if let Some(range) = range {
                self.range = range;
            }
            self.commit(notify)
        });
        if let Err(err) = result {
            (self.tree, self.range) = backup;
            return Err(err);
        }
        Ok(())
    }

    // ---- history ----

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(replay) => self.replay(&replay.states, replay.range),
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(replay) => self.replay(&replay.states, replay.range),
            None => false,
        }
    }

    fn replay(&mut self, states: &[NodeSnapshot], range: ArchRange) -> bool {
        match self.import_update(states, Some(range), Notify::Suppress) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%err, "history replay failed");
                false
            }
        }
    }

    // ---- edits ----

    pub fn insert(&mut self, content: &ArchJson) -> Result<Option<Vec<ArchId>>> {
        self.batch(BatchOptions::default(), |batch| batch.insert(content))
    }

    pub fn insert_at(&mut self, content: &ArchJson, at: ArchPoint) -> Result<Option<Vec<ArchId>>> {
        self.batch(BatchOptions::default(), |batch| batch.insert_at(content, at))
    }

    pub fn insert_markup(&mut self, markup: &str) -> Result<Option<Vec<ArchId>>> {
        self.batch(BatchOptions::default(), |batch| batch.insert_markup(markup))
    }

    pub fn insert_text(&mut self, text: &str) -> Result<Option<()>> {
        self.batch(BatchOptions::default(), |batch| batch.insert_text(text))
    }

    pub fn remove_node(&mut self, id: ArchId) -> Result<Option<()>> {
        self.batch(BatchOptions::default(), |batch| batch.remove_node(id))
    }

    pub fn remove_range(&mut self) -> Result<Option<()>> {
        self.batch(BatchOptions::default(), |batch| batch.remove_range())
    }

    pub fn delete_backward(&mut self) -> Result<Option<()>> {
        self.batch(BatchOptions::default(), |batch| batch.delete_backward())
    }

    pub fn delete_forward(&mut self) -> Result<Option<()>> {
        self.batch(BatchOptions::default(), |batch| batch.delete_forward())
    }

    pub fn split(
        &mut self,
        id: ArchId,
        offset: usize,
        until: Option<ArchId>,
    ) -> Result<Option<Option<ArchId>>> {
        self.batch(BatchOptions::default(), |batch| batch.split(id, offset, until))
    }

    pub fn merge(&mut self, id: ArchId, direction: MergeDirection) -> Result<Option<bool>> {
        self.batch(BatchOptions::default(), |batch| batch.merge(id, direction))
    }

    pub fn wrap(&mut self, name: &str) -> Result<Option<Vec<ArchId>>> {
        self.batch(BatchOptions::default(), |batch| batch.wrap(name))
    }

    pub fn unwrap_matching(
        &mut self,
        pred: impl Fn(&ArchTree, ArchId) -> bool,
    ) -> Result<Option<usize>> {
        self.batch(BatchOptions::default(), |batch| batch.unwrap(&pred))
    }

    pub fn indent(&mut self) -> Result<Option<()>> {
        self.batch(BatchOptions::default(), |batch| batch.indent())
    }

    pub fn outdent(&mut self) -> Result<Option<()>> {
        self.batch(BatchOptions::default(), |batch| batch.outdent())
    }

    /// Re-runs normalization as a silent batch.
    pub fn apply_rules(&mut self) -> Result<()> {
        self.batch(BatchOptions::silent(), |_| Ok(()))?;
        Ok(())
    }

    // ---- reading ----

    pub fn to_json(&self, id: Option<ArchId>, options: ExportOptions) -> Option<ArchJson> {
        self.tree.to_json(id, options)
    }

    pub fn to_string(&self, id: Option<ArchId>, options: ExportOptions) -> String {
        self.tree.to_string(id, options)
    }

    pub fn to_value(&self) -> Option<ArchValue> {
        self.to_json(None, ExportOptions::default())
            .map(ArchValue::from_root)
    }

    pub fn find(&self, pred: impl Fn(&ArchTree, ArchId) -> bool) -> Option<ArchId> {
        self.tree.find(pred)
    }

    pub fn find_all(&self, pred: impl Fn(&ArchTree, ArchId) -> bool) -> Vec<ArchId> {
        self.tree.find_all(pred)
    }

    /// Detached copy of a subtree, virtual text included.
    pub fn cloned_node(&self, id: ArchId) -> Option<ArchJson> {
        self.tree
            .to_json(Some(id), ExportOptions::default().keep_virtual(true))
    }

    // ---- commands ----

    pub fn run_command(&mut self, id: &str, args: Option<Value>) -> Result<()> {
        let Some(command) = self.registry.command(id) else {
            return Err(ArchError::UnknownCommand(id.to_string()));
        };
        (command.handler)(self, args)
    }

    pub fn run_query_json(&self, id: &str, args: Option<Value>) -> Result<Value> {
        let Some(query) = self.registry.query(id) else {
            return Err(ArchError::UnknownQuery(id.to_string()));
        };
        (query.handler)(self, args)
    }

    pub fn run_query<T>(&self, id: &str, args: Option<Value>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let value = self.run_query_json(id, args)?;
        Ok(serde_json::from_value(value)?)
    }
}
