//! 属性 schema 注册表
//!
//! 记录商品目录在某个 store 下暴露的可过滤属性：属性代码 → 存储位置 + 值类型。
//! 条件树编译前用它校验每个叶子节点的属性和操作符。

use crate::models::StoreId;
use crate::operators::Operator;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 属性值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Number,
    Text,
    Select,
    Multiselect,
    Boolean,
}

impl AttributeKind {
    /// 该类型允许的操作符
    pub fn allowed_operators(self) -> &'static [Operator] {
        use Operator::*;
        match self {
            Self::Number => &[Eq, Neq, Gt, Gte, Lt, Lte, Between, In, NotIn],
            Self::Text => &[
                Eq,
                Neq,
                In,
                NotIn,
                Contains,
                NotContains,
                StartsWith,
                EndsWith,
            ],
            Self::Select | Self::Multiselect => &[Eq, Neq, In, NotIn],
            Self::Boolean => &[Eq, Neq],
        }
    }

    /// 从存储的类型代码解析
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "number" | "price" | "decimal" | "int" => Some(Self::Number),
            "text" | "textarea" | "varchar" => Some(Self::Text),
            "select" => Some(Self::Select),
            "multiselect" => Some(Self::Multiselect),
            "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }

    pub fn allows(self, operator: Operator) -> bool {
        self.allowed_operators().contains(&operator)
    }

    /// 是否以数值列比较
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Number)
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Number => "number",
            Self::Text => "text",
            Self::Select => "select",
            Self::Multiselect => "multiselect",
            Self::Boolean => "boolean",
        };
        write!(f, "{}", s)
    }
}

/// 属性存储位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeBackend {
    /// 商品主表上的列
    Static { column: &'static str },
    /// 按 store 展开的属性值索引表（每个值一行）
    Indexed,
}

/// 属性描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDescriptor {
    pub code: String,
    pub backend: AttributeBackend,
    pub kind: AttributeKind,
}

impl AttributeDescriptor {
    pub fn indexed(code: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            code: code.into(),
            backend: AttributeBackend::Indexed,
            kind,
        }
    }

    fn fixed(column: &'static str, kind: AttributeKind) -> Self {
        Self {
            code: column.to_string(),
            backend: AttributeBackend::Static { column },
            kind,
        }
    }

    /// 是否可能有多个值
    pub fn is_multi_valued(&self) -> bool {
        self.kind == AttributeKind::Multiselect
    }
}

/// 某个 store 下的属性注册表
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    store_id: StoreId,
    attributes: HashMap<String, AttributeDescriptor>,
}

impl AttributeSchema {
    /// 创建只包含商品主表静态列的注册表
    pub fn new(store_id: StoreId) -> Self {
        let attributes = [
            AttributeDescriptor::fixed("entity_id", AttributeKind::Number),
            AttributeDescriptor::fixed("sku", AttributeKind::Text),
            AttributeDescriptor::fixed("type_id", AttributeKind::Select),
            AttributeDescriptor::fixed("attribute_set_id", AttributeKind::Number),
            AttributeDescriptor::fixed("status", AttributeKind::Number),
            AttributeDescriptor::fixed("visibility", AttributeKind::Number),
        ]
        .into_iter()
        .map(|d| (d.code.clone(), d))
        .collect();

        Self {
            store_id,
            attributes,
        }
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    /// 注册索引属性；同名静态列不会被覆盖
    pub fn register(&mut self, descriptor: AttributeDescriptor) {
        let is_static = self
            .attributes
            .get(&descriptor.code)
            .is_some_and(|d| matches!(d.backend, AttributeBackend::Static { .. }));
        if is_static {
            return;
        }
        self.attributes.insert(descriptor.code.clone(), descriptor);
    }

    pub fn with_attribute(mut self, code: impl Into<String>, kind: AttributeKind) -> Self {
        self.register(AttributeDescriptor::indexed(code, kind));
        self
    }

    pub fn get(&self, code: &str) -> Option<&AttributeDescriptor> {
        self.attributes.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.attributes.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}
