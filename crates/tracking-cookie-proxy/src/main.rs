use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracking_cookie_proxy::admin_api::AdminApiServer;
use tracking_cookie_proxy::config::Config;
use tracking_cookie_proxy::controller::ProxyController;
use tracking_cookie_proxy::logging::{init_logging, LogFormat};
use tracking_cookie_proxy::reporting::ResultsClient;

/// Intercepting proxy that simulates third-party tracking cookies
#[derive(Parser, Debug)]
#[command(name = "tracking-cookie-proxy")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Proxy listen port (overrides the config file)
    #[arg(short, long, env = "PROXY_PORT")]
    port: Option<u16>,

    /// YAML configuration file
    #[arg(short, long, env = "PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Emit a diagnostic record for every tagged request and injected cookie
    #[arg(short, long)]
    debug: bool,

    /// Directory holding rootCA.pem and rootCA-key.pem
    #[arg(long, env = "CAROOT")]
    ca_root: Option<PathBuf>,

    /// Admin API port (overrides the config file)
    #[arg(long)]
    admin_port: Option<u16>,

    /// Disable the admin API
    #[arg(long)]
    no_admin: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Post a test result for a page to the results service
    Report {
        /// Page URL; must carry a sessionId query parameter
        #[arg(long)]
        url: String,

        /// Result payload as JSON
        #[arg(long, default_value = "{}")]
        data: String,

        #[arg(long)]
        category: Option<String>,

        /// Results endpoint (overrides the config file)
        #[arg(long)]
        endpoint: Option<String>,
    },
}

impl Args {
    fn load_config(&self) -> Result<Config, anyhow::Error> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(port) = self.port {
            config.listen.port = port;
        }
        if let Some(ca_root) = &self.ca_root {
            config.certificate_authority.ca_root = Some(ca_root.clone());
        }
        if let Some(admin_port) = self.admin_port {
            config.admin.port = admin_port;
        }
        if self.no_admin {
            config.admin.enabled = false;
        }
        config.debug |= self.debug;
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let mut args = Args::parse();
    init_logging(args.debug, args.log_format)?;
    let config = args.load_config()?;

    match args.command.take() {
        Some(Command::Report {
            url,
            data,
            category,
            endpoint,
        }) => report(config, &url, &data, category.as_deref(), endpoint).await,
        None => serve(config).await,
    }
}

async fn serve(config: Config) -> Result<(), anyhow::Error> {
    let controller = Arc::new(ProxyController::new(config));
    let admin = controller.config().admin.clone();
    let addr = controller
        .start(controller.config().listen.port)
        .context("Failed to start tracking cookie proxy")?;
    info!("Configure browsers to use http://{} as their HTTP and HTTPS proxy", addr);

    let (admin_shutdown, _) = broadcast::channel(1);
    let admin_task = if admin.enabled {
        let server = AdminApiServer::bind(admin.socket_addr(), Arc::clone(&controller))
            .await
            .context("Failed to bind admin API")?;
        let shutdown = admin_shutdown.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = server.run(shutdown).await {
                error!("Admin API error: {}", e);
            }
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    let _ = admin_shutdown.send(());
    if let Some(task) = admin_task {
        let _ = task.await;
    }
    controller.stop().await?;
    Ok(())
}

async fn report(
    mut config: Config,
    url: &str,
    data: &str,
    category: Option<&str>,
    endpoint: Option<String>,
) -> Result<(), anyhow::Error> {
    if let Some(endpoint) = endpoint {
        config.reporting.endpoint = endpoint;
        config.reporting.validate()?;
    }
    let data: serde_json::Value =
        serde_json::from_str(data).context("--data is not valid JSON")?;
    let client = ResultsClient::new(&config.reporting)?;

    match client.post_for_page(url, data, category).await? {
        Some(directive) => {
            info!(endpoint = client.endpoint(), "results posted");
            if let Some(new_tab) = directive.new_tab_url {
                println!("newTabUrl: {new_tab}");
            }
            if let Some(navigate) = directive.navigate_url {
                println!("navigateUrl: {navigate}");
            }
        }
        None => info!("page URL has no sessionId; nothing posted"),
    }
    Ok(())
}
