//! SELECT compiler.
//!
//! Turns a [`QueryPlan`] into one SQL statement: the root table aliased `t0`,
//! one join per relation node, every selected column projected as `f<n>` in
//! hydration order, and WHERE / GROUP BY / HAVING / ORDER BY fragments from
//! every level merged into the single root statement.

use sea_query::{Condition, Expr, ExprTrait, JoinType, Order, Query, SelectStatement};

use crate::error::{GraphError, GraphResult};
use crate::hydrate::definition::{HydrationDefinition, HydrationNode};
use crate::query::args::{Direction, JoinKind, WhereMode};
use crate::query::node::{QueryNode, QueryPlan};
use crate::schema::{SchemaMetadata, TableDescriptor};
use crate::sql::predicate::{compile_tree, PredicateScope};
use crate::sql::{aggregate_sql, column_expr, iden, output_name, render, table_ref, SqlDialect};

/// SQL text plus the map for turning its rows back into objects
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub hydration: HydrationDefinition,
}

/// Fragments collected while walking the node tree
struct CompileContext {
    select: SelectStatement,
    filters: Vec<Condition>,
    group: Vec<(String, String)>,
    having: Vec<Condition>,
    order: Vec<(Expr, Order)>,
}

impl CompileContext {
    fn group_by(&mut self, alias: &str, column: &str) {
        let key = (alias.to_string(), column.to_string());
        if !self.group.contains(&key) {
            self.group.push(key);
        }
    }
}

pub struct SelectCompiler<'s> {
    schema: &'s SchemaMetadata,
    dialect: SqlDialect,
}

impl<'s> SelectCompiler<'s> {
    pub fn new(schema: &'s SchemaMetadata, dialect: SqlDialect) -> Self {
        Self { schema, dialect }
    }

    /// Compile `plan` into a single statement
    ///
    /// # Errors
    ///
    /// `GraphError::Schema` when a node's table is missing from the metadata,
    /// `GraphError::QueryShape` for invalid predicates.
    pub fn compile(&self, plan: &QueryPlan) -> GraphResult<CompiledStatement> {
        let hydration = HydrationDefinition::from_plan(plan);
        let root = &plan.root;
        let root_table = self.schema.require_table(&root.table_key)?;

        let mut ctx = CompileContext {
            select: Query::select(),
            filters: Vec::new(),
            group: Vec::new(),
            having: Vec::new(),
            order: Vec::new(),
        };
        ctx.select
            .from_as(table_ref(&root.table_key), iden(&root.table_alias));
        self.compile_node(&mut ctx, root, &hydration.root, root_table, None)?;

        if plan.aggregate {
            // Plain columns next to aggregates are the grouping keys
            for column in root.columns.iter().filter(|c| c.aggregate.is_none()) {
                ctx.group_by(&root.table_alias, &column.db_name);
            }
        }
        for (alias, column) in &ctx.group {
            ctx.select.group_by_col((iden(alias), iden(column)));
        }

        if !ctx.filters.is_empty() {
            let mut condition = Condition::all();
            for filter in ctx.filters {
                condition = condition.add(filter);
            }
            ctx.select.cond_where(condition);
        }
        if !ctx.having.is_empty() {
            let mut condition = Condition::all();
            for having in ctx.having {
                condition = condition.add(having);
            }
            ctx.select.cond_having(condition);
        }
        for (expr, order) in ctx.order {
            ctx.select.order_by_expr(expr, order);
        }
        if let Some(limit) = plan.limit {
            ctx.select.limit(limit);
        }
        if let Some(offset) = plan.offset {
            ctx.select.offset(offset);
        }

        let sql = render(&ctx.select, self.dialect);
        log::debug!("compiled {} query: {}", root.table_key, sql);
        Ok(CompiledStatement { sql, hydration })
    }

    fn compile_node(
        &self,
        ctx: &mut CompileContext,
        node: &QueryNode,
        hydration: &HydrationNode,
        table: &TableDescriptor,
        parent: Option<&QueryNode>,
    ) -> GraphResult<()> {
        let alias = node.table_alias.as_str();

        for (column, field) in node.columns.iter().zip(&hydration.fields) {
            let expr = match &column.aggregate {
                Some(aggregate) => Expr::cust(aggregate_sql(Some(alias), aggregate)),
                None => column_expr(Some(alias), &column.db_name),
            };
            ctx.select.expr_as(expr, iden(&output_name(field.position)));
        }

        let filter = match &node.args.where_tree {
            Some(tree) => compile_tree(tree, &PredicateScope::filter(table, Some(alias)))?,
            None => None,
        };

        match parent {
            None => ctx.filters.extend(filter),
            Some(parent) => {
                let relation = node.relation.as_ref().ok_or_else(|| {
                    GraphError::Compile(format!("relation node {} has no join definition", node.path))
                })?;
                let mut on = Condition::all();
                if node.join_kind == JoinKind::Cross {
                    on = on.add(Expr::cust("TRUE"));
                } else {
                    on = on.add(
                        column_expr(Some(&parent.table_alias), &relation.local_column)
                            .equals((iden(alias), iden(&relation.remote_column))),
                    );
                }
                match (node.where_mode, filter) {
                    (WhereMode::Specific, Some(filter)) => on = on.add(filter),
                    (WhereMode::Global, Some(filter)) => ctx.filters.push(filter),
                    (_, None) => {}
                }
                ctx.select
                    .join_as(join_type(node.join_kind), table_ref(&node.table_key), iden(alias), on);
            }
        }

        if let Some(group) = &node.args.group_by {
            for name in &group.columns {
                match table.column_by_entity(name) {
                    Some(column) => ctx.group_by(alias, &column.database_name),
                    None => log::warn!("dropping groupBy on unknown column {} of {}", name, table.key),
                }
            }
            if let Some(having) = &group.having {
                let scope = PredicateScope::having(table, Some(alias), &node.columns);
                ctx.having.extend(compile_tree(having, &scope)?);
            }
        }

        for entry in &node.args.order_by {
            let order = match entry.direction {
                Direction::Asc => Order::Asc,
                Direction::Desc => Order::Desc,
            };
            let aggregate = node
                .aggregate_columns()
                .find(|c| c.alias == entry.column)
                .and_then(|c| c.aggregate.as_ref());
            if let Some(aggregate) = aggregate {
                ctx.order.push((Expr::cust(aggregate_sql(Some(alias), aggregate)), order));
                continue;
            }
            match table.column_by_entity(&entry.column) {
                Some(column) => ctx
                    .order
                    .push((column_expr(Some(alias), &column.database_name), order)),
                None => log::warn!("dropping orderBy on unknown column {} of {}", entry.column, table.key),
            }
        }

        for (child, child_hydration) in node.children.iter().zip(&hydration.children) {
            let child_table = self.schema.require_table(&child.table_key)?;
            self.compile_node(ctx, child, child_hydration, child_table, Some(node))?;
        }
        Ok(())
    }
}

fn join_type(kind: JoinKind) -> JoinType {
    match kind {
        JoinKind::Inner | JoinKind::Cross => JoinType::InnerJoin,
        JoinKind::Left | JoinKind::LeftOuter => JoinType::LeftJoin,
        JoinKind::Right | JoinKind::RightOuter => JoinType::RightJoin,
        JoinKind::FullOuter => JoinType::FullOuterJoin,
    }
}
