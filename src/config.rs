/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 并行处理的条目数量（LLM 调用）
    pub max_workers: usize,
    /// 单个条目的超时时间（秒），None 表示不限制
    pub item_timeout_secs: Option<u64>,
    /// 发票文件存放目录（每个 bill 一个子目录）
    pub invoices_dir: String,
    /// CSV 结果输出目录
    pub results_dir: String,
    /// 提示词模板目录
    pub prompts_dir: String,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    // --- Snowflake 数仓配置 ---
    pub snowflake_account: String,
    pub snowflake_token: String,
    pub snowflake_database: String,
    pub snowflake_schema: String,
    pub snowflake_warehouse: String,
    pub snowflake_role: String,
    // --- NetSuite RPA 配置 ---
    pub browser_debug_port: u16,
    pub netsuite_base_url: String,
    /// 下载失败的 bill 记录文件
    pub failed_downloads_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_workers: 3,
            item_timeout_secs: None,
            invoices_dir: "data/invoices".to_string(),
            results_dir: "data/results".to_string(),
            prompts_dir: "prompts".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o".to_string(),
            snowflake_account: String::new(),
            snowflake_token: String::new(),
            snowflake_database: "PSEDM_FINANCE_PROD".to_string(),
            snowflake_schema: "EDM_GTM_FPA".to_string(),
            snowflake_warehouse: "FPA_WH".to_string(),
            snowflake_role: String::new(),
            browser_debug_port: 9222,
            netsuite_base_url: "https://system.netsuite.com".to_string(),
            failed_downloads_file: "failed_downloads.txt".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_workers: std::env::var("MAX_WORKERS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_workers),
            item_timeout_secs: std::env::var("ITEM_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()),
            invoices_dir: std::env::var("INVOICES_DIR").unwrap_or(default.invoices_dir),
            results_dir: std::env::var("RESULTS_DIR").unwrap_or(default.results_dir),
            prompts_dir: std::env::var("PROMPTS_DIR").unwrap_or(default.prompts_dir),
            llm_api_key: std::env::var("OPENAI_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("OPENAI_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("OPENAI_MODEL_NAME").unwrap_or(default.llm_model_name),
            snowflake_account: std::env::var("SNOWFLAKE_ACCOUNT").unwrap_or(default.snowflake_account),
            snowflake_token: std::env::var("SNOWFLAKE_TOKEN").unwrap_or(default.snowflake_token),
            snowflake_database: std::env::var("SNOWFLAKE_DATABASE").unwrap_or(default.snowflake_database),
            snowflake_schema: std::env::var("SNOWFLAKE_SCHEMA").unwrap_or(default.snowflake_schema),
            snowflake_warehouse: std::env::var("SNOWFLAKE_WAREHOUSE").unwrap_or(default.snowflake_warehouse),
            snowflake_role: std::env::var("SNOWFLAKE_ROLE").unwrap_or(default.snowflake_role),
            browser_debug_port: std::env::var("BROWSER_DEBUG_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(default.browser_debug_port),
            netsuite_base_url: std::env::var("NETSUITE_BASE_URL").unwrap_or(default.netsuite_base_url),
            failed_downloads_file: std::env::var("FAILED_DOWNLOADS_FILE").unwrap_or(default.failed_downloads_file),
        }
    }
}
