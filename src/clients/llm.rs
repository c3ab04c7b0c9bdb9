//! LLM 客户端
//!
//! 封装对 OpenAI 兼容 API 的调用，支持视觉输入（发票图片）。
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 每次调用返回响应内容和 token 用量

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::orchestrator::batch_runner::TokenUsage;
use crate::prompts::RenderedPrompt;

/// 一次模型调用的结果
#[derive(Debug, Clone)]
pub struct LlmReply {
    pub content: String,
    pub usage: TokenUsage,
}

/// LLM 客户端
///
/// 职责：
/// - 调用 LLM API，返回文本响应和 token 用量
/// - 只处理单次调用，不关心批处理流程
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    default_model: String,
}

impl LlmClient {
    /// 创建新的 LLM 客户端
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            default_model: config.llm_model_name.clone(),
        }
    }

    /// 发起一次聊天补全调用
    ///
    /// # 参数
    /// - `prompt`: 渲染好的提示词（含模型配置）
    /// - `images`: 图片 data URL 列表（可选），走 Vision API
    ///
    /// # 返回
    /// 返回响应内容和 token 用量；网络错误、限流和模型拒答统一收敛为 Llm 错误
    pub async fn complete(
        &self,
        prompt: &RenderedPrompt,
        images: Option<&[String]>,
    ) -> Result<LlmReply> {
        let model = if prompt.model.is_empty() {
            self.default_model.clone()
        } else {
            prompt.model.clone()
        };

        debug!("调用 LLM API，模型: {}", model);
        debug!("用户消息长度: {} 字符", prompt.user.len());

        let mut messages = Vec::new();

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(prompt.system.as_str())
            .build()
            .map_err(|e| AppError::llm(&model, e))?;
        messages.push(ChatCompletionRequestMessage::System(system_msg));

        // 构建用户消息（有图片时走 Vision API）
        let user_msg = match images {
            Some(urls) if !urls.is_empty() => {
                debug!("使用 Vision API，包含 {} 张图片", urls.len());

                let mut content_parts: Vec<ChatCompletionRequestUserMessageContentPart> =
                    Vec::new();

                content_parts.push(ChatCompletionRequestUserMessageContentPart::Text(
                    ChatCompletionRequestMessageContentPartText {
                        text: prompt.user.clone(),
                    },
                ));

                for url in urls.iter() {
                    content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                        ChatCompletionRequestMessageContentPartImage {
                            image_url: ImageUrl {
                                url: url.clone(),
                                detail: Some(ImageDetail::High),
                            },
                        },
                    ));
                }

                ChatCompletionRequestUserMessageArgs::default()
                    .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
                    .build()
                    .map_err(|e| AppError::llm(&model, e))?
            }
            _ => ChatCompletionRequestUserMessageArgs::default()
                .content(prompt.user.as_str())
                .build()
                .map_err(|e| AppError::llm(&model, e))?,
        };
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        // 构建请求（temperature / max_tokens 只在模板指定时传入）
        let mut request_args = CreateChatCompletionRequestArgs::default();
        request_args.model(&model).messages(messages);
        if let Some(t) = prompt.temperature {
            request_args.temperature(t);
        }
        if let Some(m) = prompt.max_tokens {
            request_args.max_tokens(m);
        }
        let request = request_args.build().map_err(|e| AppError::llm(&model, e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            AppError::llm(&model, e)
        })?;

        debug!("LLM API 调用成功");

        let usage = response
            .usage
            .as_ref()
            .map(|u| TokenUsage {
                input: u.prompt_tokens,
                output: u.completion_tokens,
                total: u.total_tokens,
            })
            .unwrap_or_default();

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AppError::llm(&model, "LLM 返回内容为空"))?;

        Ok(LlmReply {
            content: content.trim().to_string(),
            usage,
        })
    }
}

/// 从模型响应里抠出 JSON 文本
///
/// 模型即使被要求只返回 JSON，偶尔还是会包上 ``` 代码块或附加说明，
/// 这里做一次容错剥离
pub fn extract_json(content: &str) -> &str {
    let trimmed = content.trim();

    // 剥掉 markdown 代码块
    if let Some(rest) = trimmed.strip_prefix("```json").or_else(|| trimmed.strip_prefix("```")) {
        if let Some(inner) = rest.rsplit_once("```") {
            return inner.0.trim();
        }
        return rest.trim();
    }

    // 截取第一个 { 到最后一个 } 之间的内容
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }

    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        assert_eq!(extract_json(r#"{"a": 1}"#), r#"{"a": 1}"#);
    }

    #[test]
    fn test_extract_json_fenced() {
        let content = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json(content), r#"{"a": 1}"#);

        let content = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json(content), r#"{"a": 1}"#);
    }

    #[test]
    fn test_extract_json_with_prose() {
        let content = "Here is the result:\n{\"a\": 1}\nHope that helps!";
        assert_eq!(extract_json(content), r#"{"a": 1}"#);
    }
}
