//! Feed 索引领域模型

use crate::operators::{LogicalOperator, Operator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub type FeedId = i64;
pub type StoreId = i64;
pub type ProductId = i64;

/// 运行时规则
///
/// 每次选品都由 feed 的序列化条件重新构建，使用后丢弃，不做持久化。
#[derive(Debug, Clone)]
pub struct Rule {
    pub store_id: StoreId,
    pub root: RuleNode,
    /// 构建规则时使用的原始序列化条件
    pub conditions_serialized: String,
}

/// 规则节点（条件或逻辑组）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleNode {
    Condition(Condition),
    Group(LogicalGroup),
}

impl RuleNode {
    /// 空规则：不含子节点的 AND 组，匹配全部（经过排除过滤后的）商品
    pub fn empty() -> Self {
        Self::Group(LogicalGroup::and(Vec::new()))
    }
}

/// 条件节点：属性比较
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(alias = "field")]
    pub attribute: String,
    pub operator: Operator,
    pub value: Value,
}

impl Condition {
    pub fn new(attribute: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            attribute: attribute.into(),
            operator,
            value: value.into(),
        }
    }
}

/// 逻辑组节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalGroup {
    pub operator: LogicalOperator,
    /// 为 true 时对组的结果取反（"以下条件均不成立"）
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub negate: bool,
    #[serde(default)]
    pub children: Vec<RuleNode>,
}

impl LogicalGroup {
    pub fn new(operator: LogicalOperator, children: Vec<RuleNode>) -> Self {
        Self {
            operator,
            negate: false,
            children,
        }
    }

    pub fn and(children: Vec<RuleNode>) -> Self {
        Self::new(LogicalOperator::And, children)
    }

    pub fn or(children: Vec<RuleNode>) -> Self {
        Self::new(LogicalOperator::Or, children)
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }
}

/// 导出 feed 配置
///
/// 由外部创建和编辑；索引流程只读，除了挂载临时的运行时规则。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Feed {
    pub entity_id: FeedId,
    pub store_id: StoreId,
    #[serde(default)]
    pub conditions_serialized: String,
    #[serde(default)]
    pub exclude_disabled: bool,
    #[serde(default)]
    pub exclude_not_visible: bool,
    #[serde(default)]
    pub exclude_out_of_stock: bool,
    #[serde(skip)]
    pub rule: Option<Rule>,
}

impl Feed {
    pub fn new(entity_id: FeedId, store_id: StoreId, conditions_serialized: impl Into<String>) -> Self {
        Self {
            entity_id,
            store_id,
            conditions_serialized: conditions_serialized.into(),
            ..Default::default()
        }
    }
}

/// 商品状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Enabled,
    Disabled,
}

impl ProductStatus {
    /// 商品目录中的存储值
    pub fn code(self) -> i32 {
        match self {
            Self::Enabled => 1,
            Self::Disabled => 2,
        }
    }
}

/// 商品可见性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    NotVisible,
    Catalog,
    Search,
    CatalogAndSearch,
}

impl Visibility {
    /// 商品目录中的存储值
    pub fn code(self) -> i32 {
        match self {
            Self::NotVisible => 1,
            Self::Catalog => 2,
            Self::Search => 3,
            Self::CatalogAndSearch => 4,
        }
    }
}

/// 商品目录记录（已按 store 解析好的属性值）
#[derive(Debug, Clone)]
pub struct ProductRecord {
    pub entity_id: ProductId,
    pub store_ids: Vec<StoreId>,
    pub status: ProductStatus,
    pub visibility: Visibility,
    /// 库存记录；None 表示没有库存记录
    pub in_stock: Option<bool>,
    /// 属性值，多值属性（如 multiselect）对应多个值
    pub attributes: HashMap<String, Vec<Value>>,
}

impl ProductRecord {
    pub fn new(entity_id: ProductId, store_id: StoreId) -> Self {
        Self {
            entity_id,
            store_ids: vec![store_id],
            status: ProductStatus::Enabled,
            visibility: Visibility::CatalogAndSearch,
            in_stock: Some(true),
            attributes: HashMap::new(),
        }
    }

    pub fn with_status(mut self, status: ProductStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_stock(mut self, in_stock: Option<bool>) -> Self {
        self.in_stock = in_stock;
        self
    }

    pub fn with_attribute(mut self, code: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.entry(code.into()).or_default().push(value.into());
        self
    }

    pub fn with_values(mut self, code: impl Into<String>, values: Vec<Value>) -> Self {
        self.attributes.entry(code.into()).or_default().extend(values);
        self
    }

    /// 获取属性值（包含 entity_id / status / visibility 等静态字段）
    pub fn values_of(&self, attribute: &str) -> Vec<Value> {
        match attribute {
            "entity_id" => vec![Value::from(self.entity_id)],
            "status" => vec![Value::from(self.status.code())],
            "visibility" => vec![Value::from(self.visibility.code())],
            other => self.attributes.get(other).cloned().unwrap_or_default(),
        }
    }
}
