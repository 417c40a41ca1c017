use anyhow::{Context, Result};
use clap::Parser;
use posada_api::{router, AppState};
use posada_common::AppConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "posada-api")]
#[command(about = "Posada 시장 데이터 API 서버")]
struct Cli {
    /// 설정 파일 (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 바인드 주소 (예: 0.0.0.0:3000)
    #[arg(long)]
    bind: Option<String>,

    /// 캐시와 히스토리를 저장할 디렉터리
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }
    if let Some(level) = cli.log_level {
        config.server.log_level = level;
    }

    let level: Level = config
        .server
        .log_level
        .parse()
        .with_context(|| format!("invalid log level: {}", config.server.log_level))?;
    tracing_subscriber::fmt().with_max_level(level).init();

    let state = Arc::new(AppState::from_config(&config)?);
    let app = router(state);

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind))?;

    info!("🚀 Posada API server starting on http://{}", config.server.bind);
    info!("Available endpoints:");
    info!("  GET  /api/tokens - 토큰 목록과 24시간 변동률");
    info!("  GET  /api/movers - 상승/하락 상위 종목");
    info!("  GET  /api/whales - 대형 스왑");
    info!("  GET  /api/backtest?unit=&ticker=&interval=&periods= - 캔들 히스토리");
    info!("  GET  /api/leaderboard[?view=strategies] - 리더보드");
    info!("  POST /api/leaderboard - 거래 보고");
    info!("  GET  /health");

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
