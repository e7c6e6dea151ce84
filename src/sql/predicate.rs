//! Predicate compiler shared by WHERE, join ON and HAVING clauses.
//!
//! | comparator | SQL | comparator | SQL |
//! |---|---|---|---|
//! | `eq` | `=` (`IS NULL` for null) | `notEq` | `<>` (`IS NOT NULL` for null) |
//! | `like` | `LIKE` | `notLike` | `NOT LIKE` |
//! | `gt` `gte` `lt` `lte` | `>` `>=` `<` `<=` | `notGt` `notGte` `notLt` `notLte` | `<=` `<` `>=` `>` |
//! | `in` | `IN` | `notIn` | `NOT IN` |
//! | `isNull` | `IS NULL` | `isNotNull` | `IS NOT NULL` |
//! | `exists` | `EXISTS (..)` | `notExists` | `NOT EXISTS (..)` |
//! | `between` | `BETWEEN` | `notBetween` | `NOT BETWEEN` |

use sea_query::{BinOper, Condition, Expr, ExprTrait};
use serde_json::Value;

use crate::error::{GraphError, GraphResult};
use crate::query::args::{Comparator, Operand, WhereTree};
use crate::query::node::NodeColumn;
use crate::schema::TableDescriptor;
use crate::sql::{aggregate_sql, column_expr, value_expr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    Filter,
    Having,
}

/// What a predicate tree's column names resolve against
pub struct PredicateScope<'a> {
    table: &'a TableDescriptor,
    alias: Option<&'a str>,
    aggregates: &'a [NodeColumn],
    clause: ClauseKind,
}

impl<'a> PredicateScope<'a> {
    /// WHERE or ON clause over `table` (qualified by `alias` when given)
    pub fn filter(table: &'a TableDescriptor, alias: Option<&'a str>) -> Self {
        Self {
            table,
            alias,
            aggregates: &[],
            clause: ClauseKind::Filter,
        }
    }

    /// HAVING clause; names resolve to selected aggregates first, then columns
    pub fn having(table: &'a TableDescriptor, alias: Option<&'a str>, columns: &'a [NodeColumn]) -> Self {
        Self {
            table,
            alias,
            aggregates: columns,
            clause: ClauseKind::Having,
        }
    }

    fn resolve(&self, name: &str) -> Option<Expr> {
        if self.clause == ClauseKind::Having {
            let aggregate = self
                .aggregates
                .iter()
                .filter(|c| c.alias == name || c.name == name)
                .find_map(|c| c.aggregate.as_ref());
            if let Some(aggregate) = aggregate {
                return Some(Expr::cust(aggregate_sql(self.alias, aggregate)));
            }
        }
        self.table
            .column_by_entity(name)
            .map(|c| column_expr(self.alias, &c.database_name))
    }
}

/// Compile a predicate tree; `None` when every leaf was dropped
pub fn compile_tree(tree: &WhereTree, scope: &PredicateScope<'_>) -> GraphResult<Option<Condition>> {
    match tree {
        WhereTree::And(children) | WhereTree::Or(children) => {
            let mut condition = if matches!(tree, WhereTree::And(_)) {
                Condition::all()
            } else {
                Condition::any()
            };
            let mut empty = true;
            for child in children {
                if let Some(compiled) = compile_tree(child, scope)? {
                    condition = condition.add(compiled);
                    empty = false;
                }
            }
            Ok((!empty).then_some(condition))
        }
        WhereTree::Raw(sql) => Ok(Some(Condition::all().add(Expr::cust(sql.clone())))),
        WhereTree::Compare {
            column,
            comparator,
            operand,
        } => Ok(compile_leaf(column, *comparator, operand, scope)?.map(|e| Condition::all().add(e))),
    }
}

fn compile_leaf(
    column: &str,
    comparator: Comparator,
    operand: &Operand,
    scope: &PredicateScope<'_>,
) -> GraphResult<Option<Expr>> {
    if comparator.is_subquery() {
        if scope.clause == ClauseKind::Having {
            return Err(GraphError::QueryShape(format!(
                "{} is not supported in having",
                comparator.name()
            )));
        }
        // Only `{raw: ..}` reaches the SQL text unbound
        let subquery = match operand {
            Operand::Raw(sql) => sql,
            Operand::Value(other) => {
                return Err(GraphError::QueryShape(format!(
                    "{} expects a {{raw: <subquery>}} operand, got {other}",
                    comparator.name()
                )))
            }
        };
        let keyword = if comparator == Comparator::Exists {
            "EXISTS"
        } else {
            "NOT EXISTS"
        };
        return Ok(Some(Expr::cust(format!("{keyword} ({subquery})"))));
    }

    let Some(lhs) = scope.resolve(column) else {
        log::warn!(
            "dropping {} predicate on unknown column {} of {}",
            comparator.name(),
            column,
            scope.table.key
        );
        return Ok(None);
    };
    compare(lhs, comparator, operand).map(Some)
}

fn operand_expr(operand: &Operand) -> Expr {
    match operand {
        Operand::Raw(sql) => Expr::cust(sql.clone()),
        Operand::Value(value) => value_expr(value),
    }
}

fn is_null(operand: &Operand) -> bool {
    matches!(operand, Operand::Value(Value::Null))
}

/// Apply one comparator to a resolved left-hand side
pub fn compare(lhs: Expr, comparator: Comparator, operand: &Operand) -> GraphResult<Expr> {
    let binary = |lhs: Expr, op: BinOper| lhs.binary(op, operand_expr(operand));
    let expr = match comparator {
        Comparator::Eq if is_null(operand) => lhs.is_null(),
        Comparator::Eq => binary(lhs, BinOper::Equal),
        Comparator::NotEq if is_null(operand) => lhs.is_not_null(),
        Comparator::NotEq => binary(lhs, BinOper::NotEqual),
        Comparator::Like => binary(lhs, BinOper::Like),
        Comparator::NotLike => binary(lhs, BinOper::NotLike),
        Comparator::Gt | Comparator::NotLte => binary(lhs, BinOper::GreaterThan),
        Comparator::Gte | Comparator::NotLt => binary(lhs, BinOper::GreaterThanOrEqual),
        Comparator::Lt | Comparator::NotGte => binary(lhs, BinOper::SmallerThan),
        Comparator::Lte | Comparator::NotGt => binary(lhs, BinOper::SmallerThanOrEqual),
        Comparator::In | Comparator::NotIn => {
            let negated = comparator == Comparator::NotIn;
            match operand {
                Operand::Raw(sql) => lhs.binary(
                    if negated { BinOper::NotIn } else { BinOper::In },
                    Expr::cust(format!("({sql})")),
                ),
                Operand::Value(Value::Array(items)) if items.is_empty() => {
                    // Nothing is in an empty list
                    Expr::cust(if negated { "1 = 1" } else { "1 = 0" })
                }
                Operand::Value(value) => {
                    let items: Vec<Expr> = match value {
                        Value::Array(items) => items.iter().map(value_expr).collect(),
                        single => vec![value_expr(single)],
                    };
                    if negated {
                        lhs.is_not_in(items)
                    } else {
                        lhs.is_in(items)
                    }
                }
            }
        }
        Comparator::IsNull | Comparator::IsNotNull => {
            // `isNull: false` reads as "is not null"
            let negate = matches!(operand, Operand::Value(Value::Bool(false)));
            if (comparator == Comparator::IsNull) != negate {
                lhs.is_null()
            } else {
                lhs.is_not_null()
            }
        }
        Comparator::Between | Comparator::NotBetween => {
            let negated = comparator == Comparator::NotBetween;
            match operand {
                Operand::Value(Value::Array(bounds)) if bounds.len() == 2 => {
                    let (low, high) = (value_expr(&bounds[0]), value_expr(&bounds[1]));
                    if negated {
                        lhs.not_between(low, high)
                    } else {
                        lhs.between(low, high)
                    }
                }
                Operand::Raw(sql) => lhs.binary(
                    if negated { BinOper::NotBetween } else { BinOper::Between },
                    Expr::cust(sql.clone()),
                ),
                Operand::Value(other) => {
                    return Err(GraphError::QueryShape(format!(
                        "{} expects [low, high], got {other}",
                        comparator.name()
                    )))
                }
            }
        }
        Comparator::Exists | Comparator::NotExists => {
            return Err(GraphError::Compile(format!(
                "{} takes a subquery, not a column",
                comparator.name()
            )))
        }
    };
    Ok(expr)
}
