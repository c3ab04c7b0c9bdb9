//! 浏览器连接
//!
//! 连接到用户手动启动、已完成 Okta 登录的 Chrome 调试会话。
//! RPA 下载复用这个会话，程序自己不处理登录。

use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::error::{AppError, Result};

/// 连接到浏览器并获取 NetSuite 页面
///
/// 优先复用已打开的 NetSuite 标签页（保持登录态），
/// 找不到时新建页面并导航过去
pub async fn connect_to_browser_and_page(port: u16, target_url: &str) -> Result<(Browser, Page)> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);

    let (browser, mut handler) = Browser::connect(&browser_url).await.map_err(|e| {
        AppError::Browser(format!("无法连接到浏览器 (端口: {}): {}", port, e))
    })?;
    debug!("浏览器连接成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 短暂延迟，等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    let pages = browser
        .pages()
        .await
        .map_err(|e| AppError::Browser(format!("获取页面列表失败: {}", e)))?;
    debug!("获取到 {} 个页面", pages.len());

    // 查找已打开的 NetSuite 标签页
    for p in pages.iter() {
        if let Ok(Some(url)) = p.url().await {
            if url.contains("netsuite.com") {
                info!("✓ 复用已打开的 NetSuite 页面: {}", url);
                return Ok((browser, p.clone()));
            }
        }
    }

    debug!("未找到 NetSuite 页面，创建新页面并导航到: {}", target_url);
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| AppError::Browser(format!("创建页面失败: {}", e)))?;
    page.goto(target_url)
        .await
        .map_err(|e| AppError::Browser(format!("导航到 {} 失败: {}", target_url, e)))?;
    info!("已导航到: {}", target_url);

    Ok((browser, page))
}
