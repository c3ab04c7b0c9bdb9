//! 提示词模板库
//!
//! 启动时从目录加载所有 `*.toml` 模板，之后只读。
//! 模板里的 `{variable}` 占位符在渲染时替换，缺少绑定值属于配置错误。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{AppError, Result};

/// 单个提示词模板（对应一个 TOML 文件）
#[derive(Debug, Clone, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub system_prompt: String,
    pub user_prompt_template: String,
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// 渲染完成的提示词，直接交给 LLM 客户端
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// 提示词库
pub struct PromptLibrary {
    templates: HashMap<String, PromptTemplate>,
    placeholder: Regex,
}

impl PromptLibrary {
    /// 从目录加载所有模板
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(AppError::Config(format!(
                "提示词目录不存在: {}",
                dir.display()
            )));
        }

        let mut templates = HashMap::new();

        let entries = std::fs::read_dir(dir).map_err(|e| AppError::file(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| AppError::file(dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("toml") {
                continue;
            }

            match Self::load_file(&path) {
                Ok(template) => {
                    info!("✓ 加载提示词模板: {} ({})", template.name, file_name(&path));
                    templates.insert(template.name.clone(), template);
                }
                Err(e) => {
                    warn!("加载提示词模板失败 {}: {}", path.display(), e);
                }
            }
        }

        if templates.is_empty() {
            return Err(AppError::Config(format!(
                "提示词目录中没有可用模板: {}",
                dir.display()
            )));
        }

        Ok(Self {
            templates,
            // 只匹配 {identifier} 形式的占位符，不会碰到 JSON 示例里的花括号
            placeholder: Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap(),
        })
    }

    fn load_file(path: &PathBuf) -> Result<PromptTemplate> {
        let content = std::fs::read_to_string(path).map_err(|e| AppError::file(path, e))?;
        let template: PromptTemplate = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("模板解析失败 ({}): {}", path.display(), e)))?;
        Ok(template)
    }

    /// 获取模板
    pub fn get(&self, name: &str) -> Result<&PromptTemplate> {
        self.templates.get(name).ok_or_else(|| {
            AppError::Config(format!(
                "提示词模板 '{}' 不存在, 可用模板: {:?}",
                name,
                self.templates.keys().collect::<Vec<_>>()
            ))
        })
    }

    /// 渲染模板：替换 user_prompt_template 中的全部占位符
    ///
    /// 任何一个占位符没有绑定值都返回 MissingVariable 错误
    pub fn render(&self, name: &str, vars: &HashMap<&str, String>) -> Result<RenderedPrompt> {
        let template = self.get(name)?;

        let mut user = template.user_prompt_template.clone();
        for cap in self.placeholder.captures_iter(&template.user_prompt_template) {
            let var = &cap[1];
            let value = vars.get(var).ok_or_else(|| AppError::MissingVariable {
                template: name.to_string(),
                variable: var.to_string(),
            })?;
            user = user.replace(&format!("{{{}}}", var), value);
        }

        Ok(RenderedPrompt {
            system: template.system_prompt.trim().to_string(),
            user: user.trim().to_string(),
            model: template.model.clone(),
            temperature: template.temperature,
            max_tokens: template.max_tokens,
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.templates.keys().map(|s| s.as_str()).collect()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap_or_default().to_string_lossy().to_string()
}
