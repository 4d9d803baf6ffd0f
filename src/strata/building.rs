//! Block builder: inheritance resolution
//!
//!     The builder walks the node list left to right against one active [BlockSet]. It
//!     starts with a root set holding a single open anonymous block, so content outside
//!     named blocks keeps its position in the output.
//!
//!     Blocks live in an arena owned by the set; the currently open block is an index
//!     into that arena.
//!
//!         extends "name"  the active set is replaced by a fresh set bound to the parent
//!                         `name`. Everything collected so far is discarded.
//!         block name      opens a new named block: its name is appended to the order and
//!                         it becomes the definition of `name` in this set.
//!         endblock        opens a fresh anonymous block.
//!         blocksuper      resolved right away: the direct parent's block of the same name
//!                         (looked up transitively up the chain) is compiled and spliced
//!                         into the open block. No parent at all is an InvalidSuperCall.
//!
//! Render order
//!
//!     A set that extends another has no order of its own. Its order, and every block it
//!     does not define itself, come from the parent, so the effective order is always the
//!     order of the ultimate ancestor. A child can fill existing slots but never add one:
//!     a block whose name does not appear in the root's order is parsed and dropped.
//!     A name opened twice in one set appears twice in the order, and both slots render the
//!     final definition.
//!
//! Parent loading
//!
//!     Parents are fetched through the [Loader] only when first needed, and built with
//!     the chain of names already in progress. Seeing a name twice in that chain, or a
//!     chain longer than [MAX_EXTENDS_DEPTH], is a compilation failure.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::unsync::OnceCell;

use super::compiling::{compile_block, Located};
use super::error::{Error, Result};
use super::lexing::tokenize;
use super::loader::{Dependency, Loader};
use super::parsing::{classify, Node, NodeKind};

/// Longest extends chain accepted, counting the template being compiled.
pub const MAX_EXTENDS_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockName {
    /// Content outside any named block; numbered by its arena slot
    Anonymous(usize),
    Named(String),
}

impl fmt::Display for BlockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockName::Anonymous(index) => write!(f, "<anonymous #{}>", index),
            BlockName::Named(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Item {
    Node(Node),
    /// A `blocksuper` call, already compiled against the parent's block
    Super {
        line: usize,
        instructions: Vec<Located>,
    },
}

#[derive(Debug, Clone)]
pub struct Block {
    pub name: BlockName,
    pub origin: Arc<str>,
    pub items: Vec<Item>,
}

struct ParentLink<'l> {
    name: String,
    line: usize,
    loader: &'l dyn Loader,
    chain: Vec<String>,
    resolved: OnceCell<Resolved<'l>>,
}

struct Resolved<'l> {
    dependency: Dependency,
    set: Box<BlockSet<'l>>,
}

impl<'l> ParentLink<'l> {
    fn get(&self, origin: &Arc<str>) -> Result<&BlockSet<'l>> {
        let resolved = self.resolved.get_or_try_init(|| {
            if self.chain.iter().any(|seen| seen == &self.name) {
                return Err(Error::compilation(
                    origin,
                    self.line,
                    format!(
                        "cyclic extends: {} -> {}",
                        self.chain.join(" -> "),
                        self.name
                    ),
                ));
            }
            if self.chain.len() >= MAX_EXTENDS_DEPTH {
                return Err(Error::compilation(
                    origin,
                    self.line,
                    format!("extends chain deeper than {}", MAX_EXTENDS_DEPTH),
                ));
            }

            tracing::debug!(child = %origin, parent = %self.name, "loading parent template");
            let source = self.loader.source(&self.name)?;
            let tokens = tokenize(&source.text, self.loader.syntax(), &source.origin)?;
            let mut chain = self.chain.clone();
            chain.push(self.name.clone());
            let set = BlockBuilder::new(self.loader, source.origin.clone(), chain)
                .build(classify(tokens))?;
            Ok(Resolved {
                dependency: Dependency::from(&source),
                set: Box::new(set),
            })
        })?;
        Ok(&*resolved.set)
    }
}

/// The blocks of one template plus their render order, possibly inherited.
pub struct BlockSet<'l> {
    origin: Arc<str>,
    arena: Vec<Block>,
    order: Vec<BlockName>,
    index: HashMap<BlockName, usize>,
    parent: Option<ParentLink<'l>>,
}

impl<'l> BlockSet<'l> {
    fn new(origin: Arc<str>, parent: Option<ParentLink<'l>>) -> Self {
        let mut set = BlockSet {
            origin,
            arena: Vec::new(),
            order: Vec::new(),
            index: HashMap::new(),
            parent,
        };
        set.open_anonymous();
        set
    }

    fn open(&mut self, name: BlockName) -> usize {
        let slot = self.arena.len();
        self.arena.push(Block {
            name: name.clone(),
            origin: self.origin.clone(),
            items: Vec::new(),
        });
        self.order.push(name.clone());
        if let Some(previous) = self.index.insert(name.clone(), slot) {
            if matches!(name, BlockName::Named(_)) {
                tracing::warn!(
                    origin = %self.origin,
                    block = %name,
                    previous_slot = previous,
                    "block defined twice; both slots render the last definition"
                );
            }
        }
        slot
    }

    fn open_anonymous(&mut self) -> usize {
        let slot = self.arena.len();
        self.open(BlockName::Anonymous(slot))
    }

    fn parent(&self) -> Option<Result<&BlockSet<'l>>> {
        self.parent.as_ref().map(|link| link.get(&self.origin))
    }

    pub fn origin(&self) -> &Arc<str> {
        &self.origin
    }

    pub fn is_extended(&self) -> bool {
        self.parent.is_some()
    }

    /// Name of the parent template, if this set extends one
    pub fn parent_name(&self) -> Option<&str> {
        self.parent.as_ref().map(|link| link.name.as_str())
    }

    /// The parents loaded so far, nearest first.
    pub fn dependencies(&self) -> Vec<Dependency> {
        let mut found = Vec::new();
        let mut link = self.parent.as_ref();
        while let Some(resolved) = link.and_then(|link| link.resolved.get()) {
            found.push(resolved.dependency.clone());
            link = resolved.set.parent.as_ref();
        }
        found
    }

    /// Effective render order: the order of the chain's root.
    pub fn block_order(&self) -> Result<&[BlockName]> {
        match self.parent() {
            Some(parent) => parent?.block_order(),
            None => Ok(&self.order),
        }
    }

    /// Resolve a block by name, falling back to the parent chain.
    ///
    /// Anonymous blocks of an extending set are never slots, so they always resolve
    /// through the parent.
    pub fn block(&self, name: &BlockName) -> Result<Option<&Block>> {
        let local = self.index.get(name).map(|&slot| &self.arena[slot]);
        if let (BlockName::Named(_), Some(block)) = (name, local) {
            return Ok(Some(block));
        }
        match self.parent() {
            None => Ok(local),
            Some(parent) => parent?.block(name),
        }
    }

    /// The block a `blocksuper` inside `name` refers to.
    pub fn block_super(&self, name: &BlockName, line: usize) -> Result<Option<&Block>> {
        let parent = match self.parent() {
            Some(parent) => parent?,
            None => {
                return Err(Error::InvalidSuperCall {
                    origin: self.origin.clone(),
                    line,
                    block: name.to_string(),
                })
            }
        };
        match name {
            BlockName::Named(_) => parent.block(name),
            BlockName::Anonymous(_) => Ok(None),
        }
    }

    /// Named blocks defined by this set itself
    pub fn named_blocks(&self) -> impl Iterator<Item = &Block> {
        self.arena
            .iter()
            .filter(|block| matches!(block.name, BlockName::Named(_)))
    }
}

/// Builds a [BlockSet] from classified nodes.
pub struct BlockBuilder<'l> {
    loader: &'l dyn Loader,
    origin: Arc<str>,
    chain: Vec<String>,
}

impl<'l> BlockBuilder<'l> {
    /// `chain` holds the names of the templates being built, this one included.
    pub fn new(loader: &'l dyn Loader, origin: Arc<str>, chain: Vec<String>) -> Self {
        BlockBuilder {
            loader,
            origin,
            chain,
        }
    }

    pub fn build(self, nodes: Vec<Node>) -> Result<BlockSet<'l>> {
        let mut set = BlockSet::new(self.origin.clone(), None);
        let mut current = 0;

        for node in nodes {
            match node.kind {
                NodeKind::Extends(name) => {
                    if let Some(previous) = set.parent_name() {
                        tracing::warn!(
                            origin = %self.origin,
                            line = node.line,
                            previous = %previous,
                            next = %name,
                            "template extends more than once; earlier content is discarded"
                        );
                    }
                    let link = ParentLink {
                        name,
                        line: node.line,
                        loader: self.loader,
                        chain: self.chain.clone(),
                        resolved: OnceCell::new(),
                    };
                    set = BlockSet::new(self.origin.clone(), Some(link));
                    current = 0;
                }
                NodeKind::BlockStart(name) => {
                    current = set.open(BlockName::Named(name));
                }
                NodeKind::BlockEnd => {
                    current = set.open_anonymous();
                }
                NodeKind::BlockSuper => {
                    let name = set.arena[current].name.clone();
                    let instructions = match set.block_super(&name, node.line)? {
                        Some(block) => compile_block(block),
                        None => Vec::new(),
                    };
                    set.arena[current].items.push(Item::Super {
                        line: node.line,
                        instructions,
                    });
                }
                _ => set.arena[current].items.push(Item::Node(node)),
            }
        }

        Ok(set)
    }
}
