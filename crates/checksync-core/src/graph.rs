use std::collections::{BTreeMap, BTreeSet};

use crate::schema::{DatabaseSchema, TableRef};

/// Order `tables` so every table comes after the tables its foreign keys
/// reference. Only edges between members of `tables` count.
///
/// Returns the offending tables as `Err` when the foreign keys form a cycle.
pub fn creation_order(
    schema: &DatabaseSchema,
    tables: &[TableRef],
) -> Result<Vec<TableRef>, Vec<TableRef>> {
    let graph = build_adjacency(schema, tables);
    toposort(&graph)
}

/// Edges point from a referenced table to the tables that depend on it.
fn build_adjacency(
    schema: &DatabaseSchema,
    tables: &[TableRef],
) -> BTreeMap<TableRef, BTreeSet<TableRef>> {
    let members: BTreeSet<&TableRef> = tables.iter().collect();
    let mut graph: BTreeMap<TableRef, BTreeSet<TableRef>> = BTreeMap::new();

    for table_ref in tables {
        graph.entry(table_ref.clone()).or_default();
        let Some(table) = schema.table(table_ref) else {
            continue;
        };

        for fk in table.foreign_keys() {
            let referenced = TableRef::new(&fk.referenced_schema, &fk.referenced_table);
            // A self-reference is satisfied by the CREATE TABLE itself.
            if &referenced == table_ref || !members.contains(&referenced) {
                continue;
            }
            graph
                .entry(referenced)
                .or_default()
                .insert(table_ref.clone());
        }
    }

    graph
}

fn toposort(
    graph: &BTreeMap<TableRef, BTreeSet<TableRef>>,
) -> Result<Vec<TableRef>, Vec<TableRef>> {
    let mut indegree: BTreeMap<&TableRef, usize> = graph.keys().map(|node| (node, 0)).collect();
    for targets in graph.values() {
        for target in targets {
            *indegree.entry(target).or_insert(0) += 1;
        }
    }

    let mut ready: BTreeSet<&TableRef> = indegree
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(node, _)| *node)
        .collect();

    let mut order = Vec::with_capacity(graph.len());
    while let Some(node) = ready.pop_first() {
        order.push(node.clone());

        if let Some(targets) = graph.get(node) {
            for target in targets {
                if let Some(count) = indegree.get_mut(target) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.insert(target);
                    }
                }
            }
        }
    }

    if order.len() == graph.len() {
        Ok(order)
    } else {
        Err(indegree
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(node, _)| node.clone())
            .collect())
    }
}
