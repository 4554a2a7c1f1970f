//! Synthetic record planner
//!
//! Builds plans from the join type model plus the available indexes.
//! Planning is deterministic: root candidates are ordered by outer flag,
//! fan-out exposure, then declaration order; join targets are taken in
//! declaration order; lookup strategies follow the strict priority in the
//! module docs.

use std::sync::Arc;

use super::errors::{PlannerError, PlannerResult};
use super::plan::{
    FilterEdge, FromRecordBranch, JoinKey, JoinMode, LookupStrategy, PlanNode,
    SyntheticFromRecordPlan, SyntheticScanPlan,
};
use crate::schema::{KeyExpression, Schema, SyntheticRecordType};

/// Planner over one immutable schema snapshot
pub struct SyntheticRecordPlanner {
    schema: Arc<Schema>,
}

impl SyntheticRecordPlanner {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }

    /// Builds the full-scan plan for one synthetic type.
    pub fn scan_for_type(&self, name: &str) -> PlannerResult<SyntheticScanPlan> {
        let ty = self
            .schema
            .synthetic_type(name)
            .ok_or_else(|| PlannerError::unknown_type(name))?;

        let root = if self.has_full_outer_edge(ty) {
            self.plan_full_outer(ty)?
        } else {
            self.plan_from_best_root(ty)?
        };
        Ok(SyntheticScanPlan::new(
            Arc::clone(&self.schema),
            Arc::clone(ty),
            root,
        ))
    }

    /// Builds the reverse plan for one stored record type: every synthetic
    /// type and constituent role that type can fill, pinned and planned
    /// outward.
    ///
    /// With `allow_repeated = false`, fan-out join keys anywhere in a
    /// participating type are a planning error instead of tolerated
    /// duplicate output.
    pub fn from_stored_type(
        &self,
        record_type: &str,
        allow_repeated: bool,
    ) -> PlannerResult<SyntheticFromRecordPlan> {
        if self.schema.record_type(record_type).is_none() {
            return Err(PlannerError::unknown_record_type(record_type));
        }
        let mut branches = Vec::new();
        for ty in self.schema.synthetic_types() {
            let roles: Vec<usize> = ty
                .constituents
                .iter()
                .enumerate()
                .filter(|(_, c)| c.record_type == record_type)
                .map(|(i, _)| i)
                .collect();
            if roles.is_empty() {
                continue;
            }
            if !allow_repeated && ty.has_fan_out_edge() {
                return Err(PlannerError::repeated_key(&ty.name));
            }
            let distinct = roles.len() > 1;
            for role in roles {
                let root = self.plan_tree(ty, role, true, false)?;
                branches.push(FromRecordBranch {
                    synthetic_type: Arc::clone(ty),
                    role,
                    root,
                    distinct,
                });
            }
        }
        Ok(SyntheticFromRecordPlan::new(
            Arc::clone(&self.schema),
            record_type.to_string(),
            branches,
        ))
    }

    fn has_full_outer_edge(&self, ty: &SyntheticRecordType) -> bool {
        ty.edges.iter().any(|e| {
            let left = ty.constituent_index(&e.left).map(|i| ty.constituents[i].outer);
            let right = ty.constituent_index(&e.right).map(|i| ty.constituents[i].outer);
            left == Some(true) && right == Some(true)
        })
    }

    /// Full outer join: primary direction rooted at the first constituent,
    /// plus a symmetric sub-plan rooted at the other side, restricted to
    /// rows unreachable from the primary direction (anti mode).
    fn plan_full_outer(&self, ty: &Arc<SyntheticRecordType>) -> PlannerResult<PlanNode> {
        if ty.constituents.len() != 2 {
            return Err(PlannerError::unsupported_pattern(
                &ty.name,
                "full-outer edges are supported for two-constituent types",
            ));
        }
        let primary = self.plan_tree(ty, 0, false, false)?;
        let symmetric = self.plan_tree(ty, 1, false, true)?;
        Ok(PlanNode::FullOuterUnion {
            primary: Box::new(primary),
            symmetric: Box::new(symmetric),
        })
    }

    /// Root preference: non-outer constituents only (when any exist),
    /// fewest fan-out edge sides, then declaration order. Candidates are
    /// tried in that order; the first that plans completely wins.
    fn plan_from_best_root(&self, ty: &Arc<SyntheticRecordType>) -> PlannerResult<PlanNode> {
        let mut candidates: Vec<usize> = (0..ty.constituents.len())
            .filter(|&i| !ty.constituents[i].outer)
            .collect();
        if candidates.is_empty() {
            candidates = (0..ty.constituents.len()).collect();
        }
        candidates.sort_by_key(|&i| (self.fan_out_score(ty, i), i));

        let mut last_err = None;
        for root in candidates {
            match self.plan_tree(ty, root, false, false) {
                Ok(node) => return Ok(node),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err
            .unwrap_or_else(|| PlannerError::unsupported_pattern(&ty.name, "no root constituent")))
    }

    /// Number of edges whose key expression fans out on this constituent's
    /// side. Driving a join from a fan-out side multiplies lookups.
    fn fan_out_score(&self, ty: &SyntheticRecordType, constituent: usize) -> usize {
        let name = &ty.constituents[constituent].name;
        ty.edges
            .iter()
            .filter(|e| {
                (e.left == *name && e.left_key.fans_out())
                    || (e.right == *name && e.right_key.fans_out())
            })
            .count()
    }

    /// Grows a join tree outward from `start`, binding every constituent
    /// through an index-backed lookup driven by already-bound values.
    /// Edges left over once everything is bound become clique filters.
    ///
    /// `symmetric` turns every lookup into anti mode (missing-side
    /// enumeration of a full outer join).
    fn plan_tree(
        &self,
        ty: &Arc<SyntheticRecordType>,
        start: usize,
        seeded: bool,
        symmetric: bool,
    ) -> PlannerResult<PlanNode> {
        let n = ty.constituents.len();
        let mut node = if seeded {
            PlanNode::Seed { constituent: start }
        } else {
            PlanNode::Scan {
                constituent: start,
                record_type: ty.constituents[start].record_type.clone(),
            }
        };
        let mut bound = vec![false; n];
        bound[start] = true;
        let mut used = vec![false; ty.edges.len()];

        loop {
            let target = (0..n).find(|&i| {
                !bound[i]
                    && ty.edges.iter().any(|e| self.edge_connects(ty, e, &bound, i))
            });
            let Some(target) = target else { break };

            let connecting: Vec<usize> = ty
                .edges
                .iter()
                .enumerate()
                .filter(|(_, e)| self.edge_connects(ty, e, &bound, target))
                .map(|(i, _)| i)
                .collect();

            let (keys, strategy, consumed) = self.choose_lookup(ty, target, &connecting)?;
            for idx in consumed {
                used[idx] = true;
            }

            let mode = if symmetric {
                JoinMode::Anti
            } else if ty.constituents[target].outer {
                JoinMode::Outer
            } else {
                JoinMode::Inner
            };
            node = PlanNode::NestedLoop {
                outer: Box::new(node),
                constituent: target,
                record_type: ty.constituents[target].record_type.clone(),
                keys,
                strategy,
                mode,
            };
            bound[target] = true;
        }

        if let Some(unreached) = (0..n).find(|&i| !bound[i]) {
            // Schema validation guarantees connectivity; reaching this
            // means the model and planner disagree.
            return Err(PlannerError::unsupported_pattern(
                &ty.name,
                &format!(
                    "constituent '{}' unreachable from chosen root",
                    ty.constituents[unreached].name
                ),
            ));
        }

        let filters: Vec<FilterEdge> = ty
            .edges
            .iter()
            .enumerate()
            .filter(|(i, _)| !used[*i])
            .map(|(_, e)| FilterEdge {
                left: ty.constituent_index(&e.left).expect("validated constituent"),
                left_key: e.left_key.clone(),
                right: ty.constituent_index(&e.right).expect("validated constituent"),
                right_key: e.right_key.clone(),
            })
            .collect();
        if filters.is_empty() {
            Ok(node)
        } else {
            Ok(PlanNode::CliqueFilter {
                child: Box::new(node),
                edges: filters,
            })
        }
    }

    /// True if the edge has exactly one endpoint bound and the other equal
    /// to `target`.
    fn edge_connects(
        &self,
        ty: &SyntheticRecordType,
        edge: &crate::schema::JoinEdge,
        bound: &[bool],
        target: usize,
    ) -> bool {
        let left = ty.constituent_index(&edge.left).expect("validated constituent");
        let right = ty.constituent_index(&edge.right).expect("validated constituent");
        (left == target && bound[right]) || (right == target && bound[left])
    }

    /// Picks the lookup key and strategy binding `target`.
    ///
    /// All connecting edges merged into one composite key are tried first
    /// (multi-field joins become a single lookup); if the composite has no
    /// strategy, single edges are tried in declaration order and the rest
    /// demote to clique filters.
    fn choose_lookup(
        &self,
        ty: &SyntheticRecordType,
        target: usize,
        connecting: &[usize],
    ) -> PlannerResult<(Vec<JoinKey>, LookupStrategy, Vec<usize>)> {
        let mut attempts: Vec<Vec<usize>> = Vec::new();
        if connecting.len() > 1 {
            attempts.push(connecting.to_vec());
        }
        for &edge in connecting {
            attempts.push(vec![edge]);
        }

        for subset in attempts {
            let keys = self.join_keys(ty, target, &subset);
            let units: Vec<&KeyExpression> =
                keys.iter().flat_map(|k| k.target_key.units()).collect();
            if let Some(strategy) =
                self.match_strategy(&ty.constituents[target].record_type, &units)
            {
                return Ok((keys, strategy, subset));
            }
        }
        Err(PlannerError::no_usable_index(
            &ty.name,
            &ty.constituents[target].name,
        ))
    }

    /// Orients the chosen edges toward the target.
    fn join_keys(&self, ty: &SyntheticRecordType, target: usize, edges: &[usize]) -> Vec<JoinKey> {
        edges
            .iter()
            .map(|&i| {
                let edge = &ty.edges[i];
                let left = ty.constituent_index(&edge.left).expect("validated constituent");
                if left == target {
                    JoinKey {
                        source: ty.constituent_index(&edge.right).expect("validated constituent"),
                        source_key: edge.right_key.clone(),
                        target_key: edge.left_key.clone(),
                    }
                } else {
                    JoinKey {
                        source: left,
                        source_key: edge.left_key.clone(),
                        target_key: edge.right_key.clone(),
                    }
                }
            })
            .collect()
    }

    /// Strategy priority: exact primary key, covering index, prefix index;
    /// index ties broken by declaration order.
    fn match_strategy(
        &self,
        record_type: &str,
        lookup_units: &[&KeyExpression],
    ) -> Option<LookupStrategy> {
        let rt = self.schema.record_type(record_type)?;
        if rt.primary_key.units() == lookup_units {
            return Some(LookupStrategy::PrimaryKey);
        }

        let mut best: Option<(u8, usize, &str)> = None;
        for (pos, index) in self.schema.indexes_for(record_type).into_iter().enumerate() {
            let units = index.root.units();
            let class = if units == lookup_units {
                0
            } else if units.len() > lookup_units.len()
                && units[..lookup_units.len()] == *lookup_units
            {
                1
            } else {
                continue;
            };
            let candidate = (class, pos, index.name.as_str());
            if best.map_or(true, |b| (candidate.0, candidate.1) < (b.0, b.1)) {
                best = Some(candidate);
            }
        }
        best.map(|(_, _, name)| LookupStrategy::Index {
            index: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::PlannerErrorCode;
    use crate::schema::{JoinedTypeBuilder, SchemaBuilder};

    fn base_schema() -> SchemaBuilder {
        SchemaBuilder::new()
            .record_type("MySimpleRecord", KeyExpression::field("rec_no"))
            .record_type("MyOtherRecord", KeyExpression::field("rec_no"))
            .index(
                "MySimpleRecord$other_rec_no",
                "MySimpleRecord",
                KeyExpression::field("other_rec_no"),
            )
    }

    fn one_to_one(builder: SchemaBuilder) -> SchemaBuilder {
        builder.joined_type(
            JoinedTypeBuilder::new("Joined")
                .constituent("simple", "MySimpleRecord")
                .constituent("other", "MyOtherRecord")
                .join("simple", "other_rec_no", "other", "rec_no"),
        )
    }

    #[test]
    fn test_scan_plan_uses_pk_lookup() {
        let schema = one_to_one(base_schema()).build().unwrap();
        let planner = SyntheticRecordPlanner::new(schema);
        let plan = planner.scan_for_type("Joined").unwrap();
        let explain = plan.explain();
        assert!(explain.contains("SCAN simple"));
        assert!(explain.contains("PK_LOOKUP"));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let schema = base_schema().build().unwrap();
        let planner = SyntheticRecordPlanner::new(schema);
        let err = planner.scan_for_type("Ghost").unwrap_err();
        assert_eq!(err.code(), PlannerErrorCode::UnknownType);
    }

    #[test]
    fn test_plan_hash_deterministic() {
        let schema = one_to_one(base_schema()).build().unwrap();
        let planner = SyntheticRecordPlanner::new(Arc::clone(&schema));
        let h1 = planner.scan_for_type("Joined").unwrap().plan_hash();
        let h2 = planner.scan_for_type("Joined").unwrap().plan_hash();
        let h3 = SyntheticRecordPlanner::new(schema)
            .scan_for_type("Joined")
            .unwrap()
            .plan_hash();
        assert_eq!(h1, h2);
        assert_eq!(h2, h3);
    }

    #[test]
    fn test_from_stored_covers_both_roles_of_self_join() {
        let schema = base_schema()
            .joined_type(
                JoinedTypeBuilder::new("SelfJoin")
                    .constituent("simple1", "MySimpleRecord")
                    .constituent("simple2", "MySimpleRecord")
                    .join("simple1", "other_rec_no", "simple2", "rec_no"),
            )
            .build()
            .unwrap();
        let planner = SyntheticRecordPlanner::new(schema);
        let plan = planner.from_stored_type("MySimpleRecord", false).unwrap();
        assert_eq!(plan.branches().len(), 2);
        assert!(plan.branches().iter().all(|b| b.distinct));
    }

    #[test]
    fn test_missing_reverse_index_rejected() {
        // No index on other_rec_no: pinning "other" cannot reach "simple".
        let schema = SchemaBuilder::new()
            .record_type("MySimpleRecord", KeyExpression::field("rec_no"))
            .record_type("MyOtherRecord", KeyExpression::field("rec_no"))
            .joined_type(
                JoinedTypeBuilder::new("Joined")
                    .constituent("simple", "MySimpleRecord")
                    .constituent("other", "MyOtherRecord")
                    .join("simple", "other_rec_no", "other", "rec_no"),
            )
            .build()
            .unwrap();
        let planner = SyntheticRecordPlanner::new(schema);
        let err = planner.from_stored_type("MyOtherRecord", false).unwrap_err();
        assert_eq!(err.code(), PlannerErrorCode::NoUsableIndex);
    }

    #[test]
    fn test_repeated_key_rejected_when_not_allowed() {
        let key = KeyExpression::fan_out("nums");
        let schema = SchemaBuilder::new()
            .record_type("NestedA", KeyExpression::field("rec_no"))
            .record_type("NestedB", KeyExpression::field("rec_no"))
            .index("NestedA$nums", "NestedA", key.clone())
            .index("NestedB$nums", "NestedB", key.clone())
            .joined_type(
                JoinedTypeBuilder::new("NestedRepeated")
                    .constituent("nested_a", "NestedA")
                    .constituent("nested_b", "NestedB")
                    .join_expr("nested_a", key.clone(), "nested_b", key.clone()),
            )
            .build()
            .unwrap();
        let planner = SyntheticRecordPlanner::new(schema);
        let err = planner.from_stored_type("NestedA", false).unwrap_err();
        assert_eq!(err.code(), PlannerErrorCode::RepeatedKey);
        assert!(planner.from_stored_type("NestedA", true).is_ok());
    }

    #[test]
    fn test_full_outer_needs_two_constituents() {
        let schema = SchemaBuilder::new()
            .record_type("A", KeyExpression::field("id"))
            .record_type("B", KeyExpression::field("id"))
            .record_type("C", KeyExpression::field("id"))
            .joined_type(
                JoinedTypeBuilder::new("TooWide")
                    .outer_constituent("a", "A")
                    .outer_constituent("b", "B")
                    .constituent("c", "C")
                    .join("a", "b_id", "b", "id")
                    .join("b", "c_id", "c", "id"),
            )
            .build()
            .unwrap();
        let planner = SyntheticRecordPlanner::new(schema);
        let err = planner.scan_for_type("TooWide").unwrap_err();
        assert_eq!(err.code(), PlannerErrorCode::UnsupportedPattern);
    }

    #[test]
    fn test_outer_constituent_not_chosen_as_root() {
        let schema = base_schema()
            .joined_type(
                JoinedTypeBuilder::new("LeftJoined")
                    .constituent("simple", "MySimpleRecord")
                    .outer_constituent("other", "MyOtherRecord")
                    .join("simple", "other_rec_no", "other", "rec_no"),
            )
            .build()
            .unwrap();
        let planner = SyntheticRecordPlanner::new(schema);
        let explain = planner.scan_for_type("LeftJoined").unwrap().explain();
        assert!(explain.contains("SCAN simple"));
        assert!(explain.contains("JOIN other"));
        assert!(explain.contains("outer"));
    }

    #[test]
    fn test_clique_extra_edge_becomes_filter() {
        let schema = SchemaBuilder::new()
            .record_type("TypeA", KeyExpression::field("rec_no"))
            .record_type("TypeB", KeyExpression::field("rec_no"))
            .record_type("TypeC", KeyExpression::field("rec_no"))
            .joined_type(
                JoinedTypeBuilder::new("Clique")
                    .constituent("type_a", "TypeA")
                    .constituent("type_b", "TypeB")
                    .constituent("type_c", "TypeC")
                    .join("type_a", "type_b_rec_no", "type_b", "rec_no")
                    .join("type_b", "type_c_rec_no", "type_c", "rec_no")
                    .join("type_c", "type_a_rec_no", "type_a", "rec_no"),
            )
            .build()
            .unwrap();
        let planner = SyntheticRecordPlanner::new(schema);
        let explain = planner.scan_for_type("Clique").unwrap().explain();
        assert!(explain.contains("FILTER type_c.type_a_rec_no = type_a.rec_no"));
    }

    #[test]
    fn test_multi_field_edges_merge_into_composite_pk_lookup() {
        let pk = KeyExpression::concat([
            KeyExpression::field("num_value"),
            KeyExpression::field("rec_no"),
        ]);
        let schema = SchemaBuilder::new()
            .record_type("MySimpleRecord", pk.clone())
            .record_type("MyOtherRecord", pk)
            .joined_type(
                JoinedTypeBuilder::new("MultiFieldJoin")
                    .constituent("simple", "MySimpleRecord")
                    .constituent("other", "MyOtherRecord")
                    .join("simple", "num_value", "other", "num_value")
                    .join("simple", "other_rec_no", "other", "rec_no"),
            )
            .build()
            .unwrap();
        let planner = SyntheticRecordPlanner::new(schema);
        let explain = planner.scan_for_type("MultiFieldJoin").unwrap().explain();
        assert!(explain.contains("PK_LOOKUP"));
        assert!(explain.contains("num_value AND"));
        assert!(!explain.contains("FILTER"));
    }

    #[test]
    fn test_covering_index_preferred_over_prefix() {
        let schema = SchemaBuilder::new()
            .record_type("A", KeyExpression::field("id"))
            .record_type("B", KeyExpression::field("id"))
            .index(
                "B$wide",
                "B",
                KeyExpression::concat([KeyExpression::field("a_id"), KeyExpression::field("x")]),
            )
            .index("B$a_id", "B", KeyExpression::field("a_id"))
            .joined_type(
                JoinedTypeBuilder::new("J")
                    .constituent("a", "A")
                    .constituent("b", "B")
                    .join("a", "id", "b", "a_id"),
            )
            .build()
            .unwrap();
        let planner = SyntheticRecordPlanner::new(schema);
        let explain = planner.scan_for_type("J").unwrap().explain();
        // Exact-width index wins over the earlier-declared prefix index.
        assert!(explain.contains("INDEX B$a_id"));
    }
}
