//! Immutable plan operator trees
//!
//! A plan is a compile-time artifact: it holds schema references and
//! operator structure, never store content or transaction state. Its hash
//! is derived from structure alone and fingerprints continuations, so a
//! continuation handed to a different plan shape fails fast.

use std::sync::Arc;

use crate::executor::{ExecuteLimits, ExecutorResult, SyntheticCursor};
use crate::schema::{KeyExpression, Schema, SyntheticRecordType};
use crate::store::{StoreTransaction, StoredRecord};

/// How the inner side of a nested-loop join is fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupStrategy {
    /// Lookup key equals the target's primary key: point get
    PrimaryKey,
    /// Prefix scan of a value index
    Index { index: String },
}

/// Join mode of a nested-loop operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    /// Matches only
    Inner,
    /// Matches, plus exactly one null-completion per outer row with no
    /// match anywhere
    Outer,
    /// Null-completions only: the symmetric side of a full outer join,
    /// restricted to rows unreachable from the primary direction
    Anti,
}

impl JoinMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinMode::Inner => "inner",
            JoinMode::Outer => "outer",
            JoinMode::Anti => "anti",
        }
    }
}

/// One conjunct of a join lookup key
#[derive(Debug, Clone)]
pub struct JoinKey {
    /// Already-bound constituent driving this conjunct
    pub source: usize,
    /// Expression over the source record (may fan out)
    pub source_key: KeyExpression,
    /// Target-side expression; strategy matching compares against it
    pub target_key: KeyExpression,
}

/// An edge beyond the spanning tree, enforced as a post-match filter
#[derive(Debug, Clone)]
pub struct FilterEdge {
    pub left: usize,
    pub left_key: KeyExpression,
    pub right: usize,
    pub right_key: KeyExpression,
}

/// Plan operator tree.
///
/// Tagged variants per operator kind; traversal and continuation pairing
/// go through exhaustive matches, so a new operator kind is compile-time
/// checked everywhere.
#[derive(Debug, Clone)]
pub enum PlanNode {
    /// Ordered scan of one constituent's whole extent
    Scan { constituent: usize, record_type: String },
    /// The pinned seed record of a from-stored plan
    Seed { constituent: usize },
    /// Index-lookup nested-loop join binding one more constituent
    NestedLoop {
        outer: Box<PlanNode>,
        constituent: usize,
        record_type: String,
        keys: Vec<JoinKey>,
        strategy: LookupStrategy,
        mode: JoinMode,
    },
    /// Post-match equality filter for clique edges
    CliqueFilter {
        child: Box<PlanNode>,
        edges: Vec<FilterEdge>,
    },
    /// Primary direction unioned with the symmetric missing-side plan
    FullOuterUnion {
        primary: Box<PlanNode>,
        symmetric: Box<PlanNode>,
    },
}

impl PlanNode {
    /// Canonical one-line structural form; the plan hash is computed over
    /// this and `explain` output is derived from the same fields.
    pub(crate) fn describe(&self, out: &mut String) {
        match self {
            PlanNode::Scan {
                constituent,
                record_type,
            } => {
                out.push_str(&format!("scan({}:{})", constituent, record_type));
            }
            PlanNode::Seed { constituent } => {
                out.push_str(&format!("seed({})", constituent));
            }
            PlanNode::NestedLoop {
                outer,
                constituent,
                record_type,
                keys,
                strategy,
                mode,
            } => {
                out.push_str(&format!("join({}:{},{},", constituent, record_type, mode.as_str()));
                match strategy {
                    LookupStrategy::PrimaryKey => out.push_str("pk"),
                    LookupStrategy::Index { index } => out.push_str(&format!("idx:{}", index)),
                }
                out.push_str(",keys=[");
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        out.push(';');
                    }
                    out.push_str(&format!("{}.{}={}", key.source, key.source_key, key.target_key));
                }
                out.push_str("],");
                outer.describe(out);
                out.push(')');
            }
            PlanNode::CliqueFilter { child, edges } => {
                out.push_str("filter(edges=[");
                for (i, edge) in edges.iter().enumerate() {
                    if i > 0 {
                        out.push(';');
                    }
                    out.push_str(&format!(
                        "{}.{}={}.{}",
                        edge.left, edge.left_key, edge.right, edge.right_key
                    ));
                }
                out.push_str("],");
                child.describe(out);
                out.push(')');
            }
            PlanNode::FullOuterUnion { primary, symmetric } => {
                out.push_str("union(");
                primary.describe(out);
                out.push(',');
                symmetric.describe(out);
                out.push(')');
            }
        }
    }

    fn explain_into(&self, ty: &SyntheticRecordType, depth: usize, out: &mut String) {
        let pad = "  ".repeat(depth);
        match self {
            PlanNode::Scan {
                constituent,
                record_type,
            } => {
                out.push_str(&format!(
                    "{}SCAN {} ({})\n",
                    pad, ty.constituents[*constituent].name, record_type
                ));
            }
            PlanNode::Seed { constituent } => {
                out.push_str(&format!("{}SEED {}\n", pad, ty.constituents[*constituent].name));
            }
            PlanNode::NestedLoop {
                outer,
                constituent,
                record_type,
                keys,
                strategy,
                mode,
            } => {
                let how = match strategy {
                    LookupStrategy::PrimaryKey => "PK_LOOKUP".to_string(),
                    LookupStrategy::Index { index } => format!("INDEX {}", index),
                };
                let key_list: Vec<String> = keys
                    .iter()
                    .map(|k| {
                        format!(
                            "{}.{} = {}.{}",
                            ty.constituents[k.source].name,
                            k.source_key,
                            ty.constituents[*constituent].name,
                            k.target_key
                        )
                    })
                    .collect();
                out.push_str(&format!(
                    "{}JOIN {} ({}) {} {} ON {}\n",
                    pad,
                    ty.constituents[*constituent].name,
                    record_type,
                    mode.as_str(),
                    how,
                    key_list.join(" AND ")
                ));
                outer.explain_into(ty, depth + 1, out);
            }
            PlanNode::CliqueFilter { child, edges } => {
                let edge_list: Vec<String> = edges
                    .iter()
                    .map(|e| {
                        format!(
                            "{}.{} = {}.{}",
                            ty.constituents[e.left].name,
                            e.left_key,
                            ty.constituents[e.right].name,
                            e.right_key
                        )
                    })
                    .collect();
                out.push_str(&format!("{}FILTER {}\n", pad, edge_list.join(" AND ")));
                child.explain_into(ty, depth + 1, out);
            }
            PlanNode::FullOuterUnion { primary, symmetric } => {
                out.push_str(&format!("{}FULL_OUTER_UNION\n", pad));
                primary.explain_into(ty, depth + 1, out);
                symmetric.explain_into(ty, depth + 1, out);
            }
        }
    }
}

pub(crate) fn hash_description(description: &str) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(description.as_bytes());
    hasher.finalize()
}

/// A full-scan plan: `SELECT * FROM synthetic_type`, materialized lazily.
#[derive(Debug, Clone)]
pub struct SyntheticScanPlan {
    pub(crate) schema: Arc<Schema>,
    pub(crate) synthetic_type: Arc<SyntheticRecordType>,
    pub(crate) root: PlanNode,
    pub(crate) plan_hash: u32,
}

impl SyntheticScanPlan {
    pub(crate) fn new(
        schema: Arc<Schema>,
        synthetic_type: Arc<SyntheticRecordType>,
        root: PlanNode,
    ) -> Self {
        let mut description = format!("scan_plan:{}:{}:", synthetic_type.name, synthetic_type.ordinal);
        root.describe(&mut description);
        let plan_hash = hash_description(&description);
        Self {
            schema,
            synthetic_type,
            root,
            plan_hash,
        }
    }

    pub fn synthetic_type(&self) -> &Arc<SyntheticRecordType> {
        &self.synthetic_type
    }

    /// The schema snapshot this plan was built against
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Structural hash, independent of store content or transaction
    pub fn plan_hash(&self) -> u32 {
        self.plan_hash
    }

    /// Deterministic, human-readable operator tree
    pub fn explain(&self) -> String {
        let mut out = format!("{} [{}]\n", self.synthetic_type.name, self.synthetic_type.ordinal);
        self.root.explain_into(&self.synthetic_type, 1, &mut out);
        out
    }

    /// Executes against one caller-supplied transaction.
    ///
    /// An omitted continuation starts from the beginning; default limits
    /// run to completion.
    pub fn execute(
        &self,
        tx: Arc<dyn StoreTransaction>,
        continuation: Option<&[u8]>,
        limits: ExecuteLimits,
    ) -> ExecutorResult<SyntheticCursor> {
        SyntheticCursor::for_scan_plan(self, tx, continuation, limits)
    }
}

/// One (synthetic type, constituent role) branch of a from-stored plan
#[derive(Debug, Clone)]
pub struct FromRecordBranch {
    pub synthetic_type: Arc<SyntheticRecordType>,
    /// Pinned constituent position
    pub role: usize,
    pub root: PlanNode,
    /// True when the type contributes several roles: branch output is then
    /// deduplicated by synthetic primary key
    pub distinct: bool,
}

/// A reverse plan: every synthetic record one stored record participates
/// in, across every type and role it can fill.
#[derive(Debug, Clone)]
pub struct SyntheticFromRecordPlan {
    pub(crate) schema: Arc<Schema>,
    pub(crate) record_type: String,
    pub(crate) branches: Vec<FromRecordBranch>,
    pub(crate) plan_hash: u32,
}

impl SyntheticFromRecordPlan {
    pub(crate) fn new(
        schema: Arc<Schema>,
        record_type: String,
        branches: Vec<FromRecordBranch>,
    ) -> Self {
        let mut description = format!("from_record_plan:{}:", record_type);
        for branch in &branches {
            description.push_str(&format!(
                "[{}:{}:{}:",
                branch.synthetic_type.name, branch.role, branch.distinct
            ));
            branch.root.describe(&mut description);
            description.push(']');
        }
        let plan_hash = hash_description(&description);
        Self {
            schema,
            record_type,
            branches,
            plan_hash,
        }
    }

    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    /// The schema snapshot this plan was built against
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn branches(&self) -> &[FromRecordBranch] {
        &self.branches
    }

    /// Structural hash, independent of store content or transaction
    pub fn plan_hash(&self) -> u32 {
        self.plan_hash
    }

    /// Deterministic, human-readable operator tree
    pub fn explain(&self) -> String {
        let mut out = format!("FROM_RECORD {}\n", self.record_type);
        for branch in &self.branches {
            out.push_str(&format!(
                "  {} AS {}{}\n",
                branch.synthetic_type.name,
                branch.synthetic_type.constituents[branch.role].name,
                if branch.distinct { " DISTINCT" } else { "" }
            ));
            branch.root.explain_into(&branch.synthetic_type, 2, &mut out);
        }
        out
    }

    /// Executes for one stored record inside one caller-supplied
    /// transaction. The record is pinned: it is never re-read from the
    /// store, so the result is exact for both old and new versions during
    /// index maintenance.
    pub fn execute(
        &self,
        tx: Arc<dyn StoreTransaction>,
        record: &StoredRecord,
        continuation: Option<&[u8]>,
        limits: ExecuteLimits,
    ) -> ExecutorResult<SyntheticCursor> {
        SyntheticCursor::for_from_record_plan(self, tx, record, continuation, limits)
    }
}
