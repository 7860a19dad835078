//! 条件树评估器
//!
//! 校验条件树引用的属性，并把条件树编译为选品谓词。
//! 遍历使用显式工作栈，病态的深层条件树不会耗尽调用栈。

use crate::error::{FeedIndexError, Result};
use crate::models::{Condition, LogicalGroup, RuleNode};
use crate::operators::{LogicalOperator, Operator};
use crate::predicate::{Comparison, Predicate, Scalar, Test, coerce, escape_like};
use crate::schema::{AttributeDescriptor, AttributeSchema};
use serde_json::Value;
use std::collections::BTreeSet;

/// 条件树评估器
pub struct ConditionEvaluator<'a> {
    schema: &'a AttributeSchema,
}

enum Frame<'n> {
    Enter(&'n RuleNode),
    Exit(&'n LogicalGroup),
}

impl<'a> ConditionEvaluator<'a> {
    pub fn new(schema: &'a AttributeSchema) -> Self {
        Self { schema }
    }

    /// 收集条件树引用的全部属性
    ///
    /// 任意属性在该 store 的 schema 中不存在时返回 `InvalidAttribute`，不会静默跳过。
    pub fn collect_validated_attributes(&self, root: &RuleNode) -> Result<BTreeSet<String>> {
        let mut attributes = BTreeSet::new();
        let mut stack = vec![root];

        while let Some(node) = stack.pop() {
            match node {
                RuleNode::Condition(cond) => {
                    self.resolve(cond)?;
                    attributes.insert(cond.attribute.clone());
                }
                RuleNode::Group(group) => stack.extend(group.children.iter()),
            }
        }

        Ok(attributes)
    }

    /// 把条件树编译为谓词
    ///
    /// - AND / OR 组编译为子谓词的合取 / 析取，`negate` 组再取反
    /// - 空组（没有子节点）恒为真，无论操作符和是否取反
    /// - 比较值为空（空字符串、空列表、null）的叶子：肯定操作符恒为假，否定操作符恒为真
    pub fn compile_to_predicate(&self, root: &RuleNode) -> Result<Predicate> {
        let mut work = vec![Frame::Enter(root)];
        let mut compiled: Vec<Predicate> = Vec::new();

        while let Some(frame) = work.pop() {
            match frame {
                Frame::Enter(RuleNode::Condition(cond)) => {
                    compiled.push(self.compile_condition(cond)?);
                }
                Frame::Enter(RuleNode::Group(group)) => {
                    work.push(Frame::Exit(group));
                    work.extend(group.children.iter().rev().map(Frame::Enter));
                }
                Frame::Exit(group) => {
                    let children = compiled.split_off(compiled.len() - group.children.len());
                    compiled.push(Self::combine(group, children));
                }
            }
        }

        Ok(compiled.pop().unwrap_or(Predicate::True))
    }

    fn combine(group: &LogicalGroup, children: Vec<Predicate>) -> Predicate {
        if children.is_empty() {
            return Predicate::True;
        }

        let combined = match group.operator {
            LogicalOperator::And => Predicate::and(children),
            LogicalOperator::Or => Predicate::or(children),
        };

        if group.negate {
            Predicate::not(combined)
        } else {
            combined
        }
    }

    fn resolve(&self, cond: &Condition) -> Result<&'a AttributeDescriptor> {
        let descriptor =
            self.schema
                .get(&cond.attribute)
                .ok_or_else(|| FeedIndexError::InvalidAttribute {
                    attribute: cond.attribute.clone(),
                    store_id: self.schema.store_id(),
                })?;

        if !descriptor.kind.allows(cond.operator) {
            return Err(FeedIndexError::UnsupportedOperator {
                attribute: cond.attribute.clone(),
                operator: cond.operator.to_string(),
            });
        }

        Ok(descriptor)
    }

    fn compile_condition(&self, cond: &Condition) -> Result<Predicate> {
        let descriptor = self.resolve(cond)?;

        let Some(test) = Self::build_test(descriptor, cond.operator.positive(), &cond.value)? else {
            return Ok(if cond.operator.is_negative() {
                Predicate::True
            } else {
                Predicate::False
            });
        };

        let comparison = Predicate::Compare(Comparison {
            attribute: descriptor.code.clone(),
            backend: descriptor.backend.clone(),
            kind: descriptor.kind,
            test,
        });

        Ok(if cond.operator.is_negative() {
            Predicate::not(comparison)
        } else {
            comparison
        })
    }

    /// 构建肯定形式的检验（否定操作符按其肯定形式处理）；比较值为空时返回 None
    fn build_test(
        descriptor: &AttributeDescriptor,
        operator: Operator,
        value: &Value,
    ) -> Result<Option<Test>> {
        if is_blank(value) {
            return Ok(None);
        }

        let scalar = |v: &Value| {
            coerce(v, descriptor.kind).ok_or_else(|| FeedIndexError::ValueTypeMismatch {
                attribute: descriptor.code.clone(),
                expected: descriptor.kind.to_string(),
                actual: type_name(v).to_string(),
            })
        };

        let test = match operator {
            Operator::Eq | Operator::Neq => Test::Eq(scalar(value)?),
            Operator::Gt => Test::Gt(scalar(value)?),
            Operator::Gte => Test::Gte(scalar(value)?),
            Operator::Lt => Test::Lt(scalar(value)?),
            Operator::Lte => Test::Lte(scalar(value)?),
            Operator::Between => {
                let bounds = list_items(value);
                if bounds.len() != 2 {
                    return Err(FeedIndexError::MalformedConditions(format!(
                        "属性 {} 的 between 操作符需要 [min, max]，当前有 {} 个元素",
                        descriptor.code,
                        bounds.len()
                    )));
                }
                Test::Between(scalar(&bounds[0])?, scalar(&bounds[1])?)
            }
            Operator::In | Operator::NotIn => {
                let items = list_items(value)
                    .iter()
                    .filter(|v| !is_blank(v))
                    .map(|v| scalar(v))
                    .collect::<Result<Vec<Scalar>>>()?;
                if items.is_empty() {
                    return Ok(None);
                }
                Test::In(items)
            }
            Operator::Contains
            | Operator::NotContains
            | Operator::StartsWith
            | Operator::EndsWith => {
                let needle = escape_like(&scalar(value)?.to_text());
                let pattern = match operator {
                    Operator::Contains | Operator::NotContains => format!("%{}%", needle),
                    Operator::StartsWith => format!("{}%", needle),
                    _ => format!("%{}", needle),
                };
                Test::Like(pattern)
            }
        };

        Ok(Some(test))
    }
}

/// 列表形式的比较值：JSON 数组，或逗号分隔的字符串（如 "M, L"）
fn list_items(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::String(s) => s
            .split(',')
            .map(|part| Value::String(part.trim().to_string()))
            .collect(),
        other => vec![other.clone()],
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// 获取值的类型名称
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
