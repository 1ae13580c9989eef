//! HTTP服务器设置模块
//! 负责创建和配置HTTP服务器

use crate::api::routes;
use crate::util::config::Config;
use crate::AppState;
use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
use tracing::{info, warn};

/// HTTP服务器管理器
pub struct ServerManager;

impl ServerManager {
    /// 创建HTTP服务器
    pub async fn create_server(config: &Config, app_state: AppState) -> Result<HttpServer> {
        info!(event = "http.server.create");

        let listener = Self::bind_listener(&config.server.host, config.server.port).await?;
        let local_addr = listener.local_addr()?;

        info!(event = "http.router.build");
        let app_routes = routes(app_state);

        info!(event = "http.server.ready", address = %local_addr);
        Ok(HttpServer {
            listener,
            app_routes,
            local_addr,
        })
    }

    /// 绑定监听地址；通配地址优先尝试IPv6双栈，失败再降级IPv4
    async fn bind_listener(host: &str, port: u16) -> Result<TcpListener> {
        info!(event = "http.server.bind_start", host = %host, port);

        if !is_wildcard_host(host) {
            let addr = format_bind_addr(host, port);
            let listener = TcpListener::bind(&addr)
                .await
                .with_context(|| format!("地址 {} 绑定失败", addr))?;
            info!(event = "http.server.bound", address = %addr);
            return Ok(listener);
        }

        // 浏览器对 localhost 可能优先走 ::1，仅监听 IPv4 会出现 Connection Refused
        let v6_addr = format!("[::]:{}", port);
        match TcpListener::bind(&v6_addr).await {
            Ok(listener) => {
                info!(event = "http.server.bound", protocol = "ipv6", address = %v6_addr);
                Ok(listener)
            }
            Err(e6) => {
                warn!(event = "http.server.ipv6_unavailable", error = %e6);
                let v4_addr = format!("0.0.0.0:{}", port);
                let listener = TcpListener::bind(&v4_addr).await.map_err(|e4| {
                    anyhow::anyhow!("端口 {} 绑定失败 (IPv4): {}；之前IPv6错误: {}", port, e4, e6)
                })?;
                info!(event = "http.server.bound", protocol = "ipv4", address = %v4_addr);
                Ok(listener)
            }
        }
    }

    /// 启动服务器，阻塞直到收到关闭信号
    pub async fn start_server(server: HttpServer) -> Result<()> {
        info!(event = "http.server.start", address = %server.local_addr);

        axum::serve(server.listener, server.app_routes)
            .with_graceful_shutdown(Self::shutdown_signal())
            .await?;

        info!(event = "http.server.stopped");
        Ok(())
    }

    async fn shutdown_signal() {
        info!(event = "http.server.shutdown_wait");

        tokio::select! {
            _ = ctrl_c() => {
                info!(event = "http.server.signal", signal = "SIGINT");
            }
            _ = Self::wait_for_sigterm() => {
                info!(event = "http.server.signal", signal = "SIGTERM");
            }
            _ = Self::wait_for_sighup() => {
                warn!(event = "http.server.signal", signal = "SIGHUP", "暂不支持配置重载，准备退出");
            }
        }

        info!(event = "http.server.shutdown_begin");
    }

    /// 等待 SIGTERM 信号
    async fn wait_for_sigterm() -> std::io::Result<()> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut term_signal = signal(SignalKind::terminate())?;
            term_signal.recv().await;
            Ok(())
        }
        #[cfg(not(unix))]
        {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    /// 等待 SIGHUP 信号
    async fn wait_for_sighup() -> std::io::Result<()> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut hup_signal = signal(SignalKind::hangup())?;
            hup_signal.recv().await;
            Ok(())
        }
        #[cfg(not(unix))]
        {
            std::future::pending::<()>().await;
            Ok(())
        }
    }
}

/// HTTP服务器实例
pub struct HttpServer {
    listener: TcpListener,
    app_routes: Router,
    local_addr: SocketAddr,
}

impl HttpServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

fn is_wildcard_host(host: &str) -> bool {
    matches!(host.trim(), "" | "0.0.0.0" | "::" | "[::]")
}

fn format_bind_addr(host: &str, port: u16) -> String {
    let host = host.trim();
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address_formatting() {
        assert!(is_wildcard_host("0.0.0.0"));
        assert!(is_wildcard_host("::"));
        assert!(!is_wildcard_host("127.0.0.1"));
        assert_eq!(format_bind_addr("127.0.0.1", 8964), "127.0.0.1:8964");
        assert_eq!(format_bind_addr("::1", 8964), "[::1]:8964");
        assert_eq!(format_bind_addr("localhost", 80), "localhost:80");
    }

    #[tokio::test]
    async fn test_create_server_on_ephemeral_port() {
        let mut config = crate::model::grading::tests::test_config();
        config.server.port = 0;
        let state = AppState::new(config.clone());
        let server = ServerManager::create_server(&config, state).await.unwrap();
        assert!(server.local_addr().ip().is_loopback());
        assert_ne!(server.local_addr().port(), 0);
    }
}
