use std::sync::Arc;

use article_publisher::models::{Account, Article, Credentials, LoginSession, PlatformId, QuotaType};
use article_publisher::{
    connect_browser, App, CdpBrowser, Config, CreateTaskRequest, DomProvider,
};

#[tokio::test]
#[ignore] // 默认忽略，需要调试端口上有浏览器：cargo test -- --ignored
async fn test_browser_connection() {
    // 初始化日志
    article_publisher::logger::init();

    // 加载配置
    let config = Config::from_env();

    // 测试浏览器连接
    let result = connect_browser(config.browser_debug_port).await;

    assert!(result.is_ok(), "应该能够成功连接浏览器");
}

#[tokio::test]
#[ignore]
async fn test_open_page_and_navigate() {
    article_publisher::logger::init();
    let config = Config::from_env();

    let browser = connect_browser(config.browser_debug_port)
        .await
        .expect("连接浏览器失败");
    let provider = CdpBrowser::new(
        browser,
        config.navigation_timeout_secs,
        config.selector_timeout_secs,
    );
    let dom = provider.open().await.expect("打开页面失败");
    dom.goto("https://www.zhihu.com/signin")
        .await
        .expect("导航失败");
    let url = dom.current_url().await.expect("读取 URL 失败");
    assert!(url.contains("zhihu.com"));
}

#[tokio::test]
#[ignore]
async fn test_publish_single_task_against_live_browser() {
    article_publisher::logger::init();
    let config = Config::from_env();

    let app = App::connect(config).await.expect("连接浏览器失败");

    // 注意：请根据实际情况替换文章内容与账号 Cookie
    app.articles()
        .upsert(Article {
            id: 1,
            tenant_id: 1,
            title: "集成测试文章".to_string(),
            content: "第一段\n\n第二段".to_string(),
            keyword: None,
            images: vec![],
        })
        .await;
    app.accounts()
        .upsert(Account {
            id: 1,
            tenant_id: 1,
            platform_id: PlatformId::Toutiao,
            account_name: "头条测试账号".to_string(),
            credentials: Credentials::default(),
            session: LoginSession::default(),
        })
        .await;
    app.ledger().set_limit(1, QuotaType::Publish, 10).await;

    let task = app
        .create_task(CreateTaskRequest {
            tenant_id: 1,
            article_id: 1,
            account_id: 1,
            platform_id: PlatformId::Toutiao,
            scheduled_at: None,
        })
        .await
        .expect("创建任务失败");

    // 没有 Cookie 时流程会停在登录确认，浏览器里手动登录后重跑
    let result = app.execute_task(task.id, 1).await;
    println!("执行结果: {:?}", result.map(|t| t.status));
}

#[tokio::test]
#[ignore]
async fn test_account_session_check_against_live_browser() {
    article_publisher::logger::init();
    let config = Config::from_env();

    let app = App::connect(config).await.expect("连接浏览器失败");
    app.accounts()
        .upsert(Account {
            id: 1,
            tenant_id: 1,
            platform_id: PlatformId::Zhihu,
            account_name: "知乎测试账号".to_string(),
            credentials: Credentials::default(),
            session: LoginSession::default(),
        })
        .await;

    let valid = app
        .check_account_session(1, 1)
        .await
        .expect("会话检查失败");
    println!("知乎会话有效: {}", valid);
}

#[tokio::test]
#[ignore]
async fn test_monitor_account_against_live_browser() {
    use std::sync::Mutex;

    article_publisher::logger::init();
    let config = Config::from_env();

    let app = App::connect(config).await.expect("连接浏览器失败");
    app.accounts()
        .upsert(Account {
            id: 1,
            tenant_id: 1,
            platform_id: PlatformId::Sohu,
            account_name: "搜狐测试账号".to_string(),
            credentials: Credentials::default(),
            session: LoginSession::default(),
        })
        .await;

    let events: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let handle = app
        .monitor_account(
            1,
            1,
            Arc::new(move |platform, online| {
                println!("{} 状态变化: {}", platform, online);
                sink.lock().unwrap().push(online);
            }),
        )
        .await
        .expect("启动监控失败");

    tokio::time::sleep(std::time::Duration::from_secs(30)).await;
    handle.stop();
    assert!(!events.lock().unwrap().is_empty(), "应至少上报一次初始状态");
}
