//! 规则聚合
//!
//! 把 feed 上保存的序列化条件树解析成运行时规则，绑定 feed 的 store，
//! 并作为临时字段挂到 feed 上。结构不合法的条件在任何查询执行前失败。

use crate::error::{FeedIndexError, Result};
use crate::models::{Feed, Rule, RuleNode};
use tracing::debug;

/// 默认的条件树最大嵌套深度
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// 规则聚合器
#[derive(Debug, Clone, Copy)]
pub struct RuleAggregator {
    max_depth: usize,
}

impl RuleAggregator {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// 解析序列化条件
    ///
    /// 空白字符串视为空的 AND 组，匹配全部商品。
    pub fn parse_conditions(&self, serialized: &str) -> Result<RuleNode> {
        if serialized.trim().is_empty() {
            return Ok(RuleNode::empty());
        }

        let root: RuleNode = serde_json::from_str(serialized)
            .map_err(|e| FeedIndexError::MalformedConditions(format!("条件解析失败: {}", e)))?;
        self.validate(&root)?;

        Ok(root)
    }

    /// 由 feed 构建运行时规则，不修改 feed
    pub fn build_rule(&self, feed: &Feed) -> Result<Rule> {
        let root = self.parse_conditions(&feed.conditions_serialized)?;
        Ok(Rule {
            store_id: feed.store_id,
            root,
            conditions_serialized: feed.conditions_serialized.clone(),
        })
    }

    /// 构建运行时规则并挂到 feed 上
    ///
    /// 规则只在本次运行内有效，调用方不应持久化。
    pub fn build_runtime_rule<'f>(&self, feed: &'f mut Feed) -> Result<&'f Rule> {
        let rule = self.build_rule(feed)?;
        debug!(
            feed_id = feed.entity_id,
            store_id = feed.store_id,
            "运行时规则已构建"
        );
        Ok(feed.rule.insert(rule))
    }

    /// 结构校验：叶子必须有属性代码，嵌套深度不超过上限
    fn validate(&self, root: &RuleNode) -> Result<()> {
        let mut stack: Vec<(&RuleNode, String, usize)> = vec![(root, "root".to_string(), 1)];

        while let Some((node, path, depth)) = stack.pop() {
            if depth > self.max_depth {
                return Err(FeedIndexError::MalformedConditions(format!(
                    "条件 '{}' 嵌套深度超过上限 {}",
                    path, self.max_depth
                )));
            }

            match node {
                RuleNode::Condition(cond) => {
                    if cond.attribute.trim().is_empty() {
                        return Err(FeedIndexError::MalformedConditions(format!(
                            "条件 '{}' 的属性不能为空",
                            path
                        )));
                    }
                }
                RuleNode::Group(group) => {
                    for (i, child) in group.children.iter().enumerate().rev() {
                        stack.push((child, format!("{}.children[{}]", path, i), depth + 1));
                    }
                }
            }
        }

        Ok(())
    }
}

impl Default for RuleAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}
