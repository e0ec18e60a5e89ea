use anyhow::Result;

use article_publisher::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    article_publisher::logger::init();

    // 加载配置
    let config = Config::from_env();

    // 连接浏览器并运行发布引擎
    let app = App::connect(config).await?;
    app.run().await?;

    Ok(())
}
