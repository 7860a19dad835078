//! 选品谓词
//!
//! 条件树编译后的中间表示。构造时做常量折叠和扁平化，
//! 可渲染为 PostgreSQL 的 WHERE 子句（参数全部绑定），也可在内存中对商品记录求值。

use crate::models::{ProductRecord, StoreId};
use crate::schema::{AttributeBackend, AttributeKind};
use serde_json::Value;
use sqlx::{Postgres, QueryBuilder};

/// 属性值索引表，每个 (商品, store, 属性, 值) 一行
pub const ATTRIBUTE_INDEX_TABLE: &str = "catalog_product_index_attribute";

/// 标量比较值
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

/// 对单个属性值的检验（只有肯定形式，否定由 `Predicate::Not` 表示）
#[derive(Debug, Clone, PartialEq)]
pub enum Test {
    Eq(Scalar),
    Gt(Scalar),
    Gte(Scalar),
    Lt(Scalar),
    Lte(Scalar),
    Between(Scalar, Scalar),
    In(Vec<Scalar>),
    /// 大小写不敏感的 LIKE 模式，`%` / `_` 已转义
    Like(String),
}

/// 属性比较
///
/// 多值属性只要有一个值通过检验即视为匹配。
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub attribute: String,
    pub backend: AttributeBackend,
    pub kind: AttributeKind,
    pub test: Test,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    True,
    False,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Compare(Comparison),
}

impl Predicate {
    /// 合取：扁平化嵌套 AND，遇到 False 短路，空列表为 True
    pub fn and(children: Vec<Predicate>) -> Self {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Self::True => {}
                Self::False => return Self::False,
                Self::And(nested) => flat.extend(nested),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Self::True,
            1 => flat.pop().unwrap_or(Self::True),
            _ => Self::And(flat),
        }
    }

    /// 析取：扁平化嵌套 OR，遇到 True 短路，空列表为 False
    pub fn or(children: Vec<Predicate>) -> Self {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Self::False => {}
                Self::True => return Self::True,
                Self::Or(nested) => flat.extend(nested),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Self::False,
            1 => flat.pop().unwrap_or(Self::False),
            _ => Self::Or(flat),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Predicate) -> Self {
        match inner {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Self::True | Self::False)
    }

    /// 在内存中对商品记录求值
    pub fn matches(&self, product: &ProductRecord) -> bool {
        match self {
            Self::True => true,
            Self::False => false,
            Self::And(children) => children.iter().all(|c| c.matches(product)),
            Self::Or(children) => children.iter().any(|c| c.matches(product)),
            Self::Not(inner) => !inner.matches(product),
            Self::Compare(cmp) => cmp.matches(&product.values_of(&cmp.attribute)),
        }
    }

    /// 渲染为 SQL 布尔表达式
    ///
    /// 商品主表别名为 `e`；比较值全部通过 `push_bind` 绑定。
    pub fn push_sql(&self, qb: &mut QueryBuilder<'_, Postgres>, store_id: StoreId) {
        match self {
            Self::True => {
                qb.push("TRUE");
            }
            Self::False => {
                qb.push("FALSE");
            }
            Self::And(children) | Self::Or(children) => {
                let joiner = if matches!(self, Self::And(_)) { " AND " } else { " OR " };
                qb.push("(");
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        qb.push(joiner);
                    }
                    child.push_sql(qb, store_id);
                }
                qb.push(")");
            }
            Self::Not(inner) => {
                qb.push("NOT ");
                inner.push_sql(qb, store_id);
            }
            Self::Compare(cmp) => cmp.push_sql(qb, store_id),
        }
    }
}

impl Comparison {
    /// 任意一个值通过检验即匹配；没有值时不匹配
    pub fn matches(&self, values: &[Value]) -> bool {
        values.iter().any(|v| self.test_value(v))
    }

    fn test_value(&self, value: &Value) -> bool {
        let Some(actual) = coerce(value, self.kind) else {
            return false;
        };

        match &self.test {
            Test::Eq(expected) => actual == *expected,
            Test::Gt(expected) => compare(&actual, expected).is_some_and(|o| o.is_gt()),
            Test::Gte(expected) => compare(&actual, expected).is_some_and(|o| o.is_ge()),
            Test::Lt(expected) => compare(&actual, expected).is_some_and(|o| o.is_lt()),
            Test::Lte(expected) => compare(&actual, expected).is_some_and(|o| o.is_le()),
            Test::Between(low, high) => {
                compare(&actual, low).is_some_and(|o| o.is_ge())
                    && compare(&actual, high).is_some_and(|o| o.is_le())
            }
            Test::In(list) => list.contains(&actual),
            Test::Like(pattern) => match actual {
                Scalar::Text(text) => like_match(&text.to_lowercase(), &pattern.to_lowercase()),
                Scalar::Number(_) => false,
            },
        }
    }

    fn push_sql(&self, qb: &mut QueryBuilder<'_, Postgres>, store_id: StoreId) {
        match &self.backend {
            AttributeBackend::Static { column } => {
                let column = format!("e.{}", column);
                qb.push("(").push(&column).push(" IS NOT NULL AND ");
                push_test(qb, &column, &self.test);
                qb.push(")");
            }
            AttributeBackend::Indexed => {
                let column = if self.kind.is_numeric() || self.kind == AttributeKind::Boolean {
                    "a.value_number"
                } else {
                    "a.value_text"
                };
                qb.push("EXISTS (SELECT 1 FROM ")
                    .push(ATTRIBUTE_INDEX_TABLE)
                    .push(" a WHERE a.product_id = e.entity_id AND a.store_id = ")
                    .push_bind(store_id)
                    .push(" AND a.attribute_code = ")
                    .push_bind(self.attribute.clone())
                    .push(" AND ");
                push_test(qb, column, &self.test);
                qb.push(")");
            }
        }
    }
}

fn push_test(qb: &mut QueryBuilder<'_, Postgres>, column: &str, test: &Test) {
    match test {
        Test::Eq(v) => push_binary(qb, column, " = ", v),
        Test::Gt(v) => push_binary(qb, column, " > ", v),
        Test::Gte(v) => push_binary(qb, column, " >= ", v),
        Test::Lt(v) => push_binary(qb, column, " < ", v),
        Test::Lte(v) => push_binary(qb, column, " <= ", v),
        Test::Between(low, high) => {
            push_binary(qb, column, " >= ", low);
            push_binary(qb.push(" AND "), column, " <= ", high);
        }
        Test::In(list) => {
            qb.push(column).push(" = ANY(");
            if list.iter().all(|s| matches!(s, Scalar::Number(_))) {
                let numbers: Vec<f64> = list
                    .iter()
                    .filter_map(|s| match s {
                        Scalar::Number(n) => Some(*n),
                        Scalar::Text(_) => None,
                    })
                    .collect();
                qb.push_bind(numbers);
            } else {
                let texts: Vec<String> = list.iter().map(Scalar::to_text).collect();
                qb.push_bind(texts);
            }
            qb.push(")");
        }
        Test::Like(pattern) => {
            qb.push(column).push("::text ILIKE ").push_bind(pattern.clone());
        }
    }
}

fn push_binary(qb: &mut QueryBuilder<'_, Postgres>, column: &str, op: &str, value: &Scalar) {
    qb.push(column).push(op);
    match value {
        Scalar::Number(n) => qb.push_bind(*n),
        Scalar::Text(t) => qb.push_bind(t.clone()),
    };
}

impl Scalar {
    pub fn to_text(&self) -> String {
        match self {
            Self::Number(n) => format_number(*n),
            Self::Text(t) => t.clone(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn compare(a: &Scalar, b: &Scalar) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Scalar::Number(x), Scalar::Number(y)) => x.partial_cmp(y),
        (Scalar::Text(x), Scalar::Text(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// 把 JSON 值转换为属性类型对应的标量
///
/// 数值类型接受数字和数字字符串；布尔类型映射为 1/0；文本类型接受字符串和数字。
pub fn coerce(value: &Value, kind: AttributeKind) -> Option<Scalar> {
    match kind {
        AttributeKind::Number => match value {
            Value::Number(n) => n.as_f64().map(Scalar::Number),
            Value::String(s) => s.trim().parse().ok().map(Scalar::Number),
            _ => None,
        },
        AttributeKind::Boolean => match value {
            Value::Bool(b) => Some(Scalar::Number(if *b { 1.0 } else { 0.0 })),
            Value::Number(n) => n.as_f64().map(|f| Scalar::Number(if f != 0.0 { 1.0 } else { 0.0 })),
            Value::String(s) => match s.trim() {
                "1" | "true" => Some(Scalar::Number(1.0)),
                "0" | "false" => Some(Scalar::Number(0.0)),
                _ => None,
            },
            _ => None,
        },
        AttributeKind::Text | AttributeKind::Select | AttributeKind::Multiselect => match value {
            Value::String(s) => Some(Scalar::Text(s.clone())),
            Value::Number(n) => n.as_f64().map(|f| Scalar::Text(format_number(f))),
            _ => None,
        },
    }
}

/// 转义 LIKE 模式中的特殊字符
pub fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// 内存中的 LIKE 匹配，支持 `%`、`_` 和反斜杠转义
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => tokens.push(LikeToken::Literal(chars.next().unwrap_or('\\'))),
            '%' => tokens.push(LikeToken::Any),
            '_' => tokens.push(LikeToken::One),
            other => tokens.push(LikeToken::Literal(other)),
        }
    }

    // dp[j]: text[..i] 能否匹配 tokens[..j]
    let mut dp = vec![false; tokens.len() + 1];
    dp[0] = true;
    for j in 1..=tokens.len() {
        dp[j] = dp[j - 1] && tokens[j - 1] == LikeToken::Any;
    }
    for &ch in &text {
        let mut next = vec![false; tokens.len() + 1];
        for j in 1..=tokens.len() {
            next[j] = match tokens[j - 1] {
                LikeToken::Any => next[j - 1] || dp[j],
                LikeToken::One => dp[j - 1],
                LikeToken::Literal(l) => dp[j - 1] && l == ch,
            };
        }
        dp = next;
    }
    dp[tokens.len()]
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LikeToken {
    Any,
    One,
    Literal(char),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn color_eq(value: &str) -> Predicate {
        Predicate::Compare(Comparison {
            attribute: "color".to_string(),
            backend: AttributeBackend::Indexed,
            kind: AttributeKind::Select,
            test: Test::Eq(Scalar::Text(value.to_string())),
        })
    }

    #[test]
    fn test_and_or_folding() {
        assert_eq!(Predicate::and(vec![]), Predicate::True);
        assert_eq!(Predicate::or(vec![]), Predicate::False);
        assert_eq!(
            Predicate::and(vec![color_eq("red"), Predicate::False]),
            Predicate::False
        );
        assert_eq!(
            Predicate::or(vec![color_eq("red"), Predicate::True]),
            Predicate::True
        );
        assert_eq!(
            Predicate::and(vec![Predicate::True, color_eq("red")]),
            color_eq("red")
        );
    }

    #[test]
    fn test_nested_groups_are_flattened() {
        let nested = Predicate::and(vec![
            color_eq("red"),
            Predicate::and(vec![color_eq("blue"), color_eq("green")]),
        ]);
        match nested {
            Predicate::And(children) => assert_eq!(children.len(), 3),
            other => panic!("unexpected predicate: {:?}", other),
        }
    }

    #[test]
    fn test_double_negation() {
        let p = Predicate::not(Predicate::not(color_eq("red")));
        assert_eq!(p, color_eq("red"));
        assert_eq!(Predicate::not(Predicate::True), Predicate::False);
    }

    #[test]
    fn test_multi_value_matching() {
        let cmp = Comparison {
            attribute: "size".to_string(),
            backend: AttributeBackend::Indexed,
            kind: AttributeKind::Multiselect,
            test: Test::In(vec![Scalar::Text("M".to_string()), Scalar::Text("L".to_string())]),
        };
        assert!(cmp.matches(&[json!("S"), json!("L")]));
        assert!(!cmp.matches(&[json!("S")]));
        assert!(!cmp.matches(&[]));
    }

    #[test]
    fn test_like_matching() {
        assert!(like_match("blue shirt", "%shirt"));
        assert!(like_match("blue shirt", "blue%"));
        assert!(like_match("blue shirt", "%e s%"));
        assert!(!like_match("blue shirt", "red%"));
        assert!(like_match("50%off", &format!("%{}%", escape_like("0%o"))));
        assert!(!like_match("50off", &format!("%{}%", escape_like("0%o"))));
        assert!(like_match("ab", "a_"));
    }

    #[test]
    fn test_coerce() {
        assert_eq!(coerce(&json!("12.5"), AttributeKind::Number), Some(Scalar::Number(12.5)));
        assert_eq!(coerce(&json!(true), AttributeKind::Boolean), Some(Scalar::Number(1.0)));
        assert_eq!(coerce(&json!(42), AttributeKind::Select), Some(Scalar::Text("42".to_string())));
        assert_eq!(coerce(&json!("abc"), AttributeKind::Number), None);
        assert_eq!(coerce(&json!(["x"]), AttributeKind::Text), None);
    }

    #[test]
    fn test_push_sql_binds_values() {
        let predicate = Predicate::or(vec![
            color_eq("red"),
            Predicate::not(Predicate::Compare(Comparison {
                attribute: "sku".to_string(),
                backend: AttributeBackend::Static { column: "sku" },
                kind: AttributeKind::Text,
                test: Test::Like("%tee%".to_string()),
            })),
        ]);

        let mut qb = QueryBuilder::<Postgres>::new("SELECT e.entity_id FROM catalog_products e WHERE ");
        predicate.push_sql(&mut qb, 1);
        let sql = qb.sql();

        assert!(sql.contains("EXISTS (SELECT 1 FROM catalog_product_index_attribute a"));
        assert!(sql.contains("a.value_text = $3"));
        assert!(sql.contains(" OR NOT (e.sku IS NOT NULL AND e.sku::text ILIKE $4)"));
        // 比较值不会出现在 SQL 文本中
        assert!(!sql.contains("red"));
    }
}
