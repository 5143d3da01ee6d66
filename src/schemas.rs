//! 结构化输出 schema
//!
//! ResponseSchema 是运行时使用的「名称 + JSON Schema + 校验器」；具体类型由 schemars 自动生成，
//! 校验即按该类型反序列化。
//! response_schema_for(product) 按产品类型选择 schema（salary / salarios → SalaryResponse，其余 → ScraperResponse）。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 校验并规范化一个候选对象；失败时返回原因
pub type SchemaValidator = fn(&Value) -> Result<Value, String>;

/// 运行时 schema：名称 + JSON Schema 文档 + 校验器
#[derive(Debug, Clone, Serialize)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: Value,
    #[serde(skip)]
    validator: SchemaValidator,
}

impl PartialEq for ResponseSchema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.schema == other.schema
    }
}

/// 只要求是 JSON 对象
fn accept_object(value: &Value) -> Result<Value, String> {
    if value.is_object() {
        Ok(value.clone())
    } else {
        Err("expected a JSON object".to_string())
    }
}

/// 按目标类型反序列化，再序列化回去（补齐默认值）
fn validate_as<T: DeserializeOwned + Serialize>(value: &Value) -> Result<Value, String> {
    let typed: T = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
    serde_json::to_value(typed).map_err(|e| e.to_string())
}

impl ResponseSchema {
    /// 手写 schema；只校验顶层是对象
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
            validator: accept_object,
        }
    }

    /// 由 schemars 类型生成，校验时按该类型反序列化
    pub fn of<T: JsonSchema + DeserializeOwned + Serialize>(name: &str) -> Self {
        let schema = serde_json::to_value(schema_for!(T)).unwrap_or(Value::Null);
        Self {
            name: name.to_string(),
            schema,
            validator: validate_as::<T>,
        }
    }

    /// 不符合 schema 的对象返回 Err，符合的返回规范化后的对象
    pub fn validate(&self, value: &Value) -> Result<Value, String> {
        (self.validator)(value).map_err(|e| format!("does not match {}: {}", self.name, e))
    }

    /// 注入模型的格式说明
    pub fn instruction(&self) -> String {
        let pretty = serde_json::to_string_pretty(&self.schema).unwrap_or_default();
        format!(
            "Respond ONLY with a single JSON object named {} that conforms to this JSON Schema:\n```json\n{}\n```",
            self.name, pretty
        )
    }
}

/// 通用调研结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ScraperResponse {
    /// 源语言搜索查询
    pub query_es: String,
    /// 实际使用的最终查询
    pub query_final: String,
    /// 找到并处理的 URL
    pub urls: Vec<String>,
    /// 是否使用了浏览器自动化
    pub used_playwright: bool,
    /// 发现摘要
    pub summary: String,
    /// 提取出的结构化数据
    pub data_extracted: HashMap<String, Value>,
    /// pending / valid / invalid
    pub validation_status: String,
    pub validation_notes: String,
}

impl Default for ScraperResponse {
    fn default() -> Self {
        Self {
            query_es: String::new(),
            query_final: String::new(),
            urls: Vec::new(),
            used_playwright: false,
            summary: String::new(),
            data_extracted: HashMap::new(),
            validation_status: "pending".to_string(),
            validation_notes: String::new(),
        }
    }
}

/// 单个岗位的薪资数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SalaryData {
    /// 岗位名称
    pub position: String,
    #[serde(default)]
    pub salary_min: Option<f64>,
    #[serde(default)]
    pub salary_max: Option<f64>,
    #[serde(default)]
    pub salary_avg: Option<f64>,
    /// year / month / hour
    #[serde(default = "default_salary_period")]
    pub salary_period: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub source_url: Option<String>,
}

fn default_salary_period() -> String {
    "year".to_string()
}

fn default_currency() -> String {
    "EUR".to_string()
}

/// 薪资调研结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SalaryResponse {
    /// 被调研的公司
    pub provider: String,
    pub country: String,
    pub query_used: String,
    #[serde(default)]
    pub salaries: Vec<SalaryData>,
    #[serde(default)]
    pub sources: Vec<String>,
    /// 执行摘要
    pub summary: String,
    /// recent / old / unknown
    #[serde(default = "default_freshness")]
    pub data_freshness: String,
    /// high / medium / low
    #[serde(default = "default_confidence")]
    pub confidence: String,
    #[serde(default)]
    pub notes: String,
}

fn default_freshness() -> String {
    "unknown".to_string()
}

fn default_confidence() -> String {
    "medium".to_string()
}

/// 按产品类型选择 schema（大小写不敏感）
pub fn response_schema_for(product: &str) -> ResponseSchema {
    match product.to_lowercase().as_str() {
        "salary" | "salarios" => ResponseSchema::of::<SalaryResponse>("SalaryResponse"),
        _ => ResponseSchema::of::<ScraperResponse>("ScraperResponse"),
    }
}

/// ReAct 工具调用格式：`{"tool": "...", "args": {...}}`（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，如 brave_web_search、simple_scrape_url
    pub tool: String,
    /// 工具参数，依工具不同而不同
    pub args: HashMap<String, Value>,
}

/// 工具调用的 JSON Schema 字符串，拼入 system prompt
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
