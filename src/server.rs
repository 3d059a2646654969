use std::fs::File;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result, anyhow};
use tiny_http::{Header, Request, Response, Server};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;

const GAME_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>JS-DOS Game Player</title>
    <link rel="stylesheet" href="https://v8.js-dos.com/8.xx/8.3.14/js-dos.css">
    <script src="https://v8.js-dos.com/8.xx/8.3.14/js-dos.js"></script>
</head>
<body>
    <div id="dos" style="width: 640px; height: 400px;"></div>
    <script>
        const props = Dos(document.getElementById("dos"), {
            url: "{game_url}",
            autoStart: true,
        });
        {extra_script}
    </script>
</body>
</html>"#;

/// Shift+PageUp toggles the emulator pause (Alt+Pause).
const PAUSE_HOOK: &str = r#"function togglePause(event) {
            if (event.key === 'PageUp' && event.shiftKey) {
                document.dispatchEvent(new KeyboardEvent('keydown', { key: 'Alt', code: 'AltLeft', bubbles: true }));
                document.dispatchEvent(new KeyboardEvent('keydown', { key: 'Pause', code: 'Pause', altKey: true, bubbles: true }));
            }
        }
        document.addEventListener('keydown', togglePause);"#;

pub fn render_page(game_url: &str, lite: bool) -> String {
    GAME_PAGE
        .replace("{game_url}", game_url)
        .replace("{extra_script}", if lite { PAUSE_HOOK } else { "" })
}

/// Static server for the js-dos page and the game bundle folder, running on
/// its own thread until [`GameServer::stop`].
pub struct GameServer {
    server: Arc<Server>,
    thread: Option<JoinHandle<()>>,
    port: u16,
}

struct Site {
    root: PathBuf,
    page: String,
    dosbox_conf: Option<PathBuf>,
}

impl GameServer {
    pub fn start(config: &ServerConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let server = Server::http(&addr).map_err(|e| anyhow!("failed to bind {addr}: {e}"))?;
        let port = server
            .server_addr()
            .to_ip()
            .map(|a| a.port())
            .context("server is not listening on an IP address")?;

        let page = match &config.custom_html {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
            None => {
                let bundle = &config.bundle;
                let game_url = if bundle.starts_with("http://") || bundle.starts_with("https://") {
                    bundle.clone()
                } else {
                    format!("/{}", bundle.trim_start_matches('/'))
                };
                render_page(&game_url, config.lite)
            }
        };
        let site = Site {
            root: config.root.clone(),
            page,
            dosbox_conf: config.dosbox_conf.clone(),
        };

        let server = Arc::new(server);
        let worker = server.clone();
        let thread = std::thread::Builder::new()
            .name("game-server".into())
            .spawn(move || {
                for request in worker.incoming_requests() {
                    site.handle(request);
                }
            })
            .context("failed to spawn server thread")?;

        info!("serving {} on http://localhost:{port}", config.root.display());
        Ok(Self {
            server,
            thread: Some(thread),
            port,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.server.unblock();
        if thread.join().is_err() {
            warn!("game server thread panicked");
        }
        info!("game server on port {} stopped", self.port);
    }
}

impl Drop for GameServer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Site {
    fn handle(&self, request: Request) {
        let path = request.url().split(['?', '#']).next().unwrap_or("/").to_string();
        debug!("GET {path}");
        let result = match path.as_str() {
            "/" | "/index.html" => request.respond(
                typed(Response::from_string(self.page.clone()), "text/html"),
            ),
            "/dosbox.conf" => match self.dosbox_conf.as_deref().map(File::open) {
                Some(Ok(file)) => request
                    .respond(typed(Response::from_file(file), "text/plain")),
                _ => {
                    warn!("dosbox.conf requested but not available");
                    request.respond(
                        Response::from_string("dosbox.conf file not found").with_status_code(404),
                    )
                }
            },
            _ => match resolve(&self.root, &path) {
                None => request.respond(Response::from_string("forbidden").with_status_code(403)),
                Some(file_path) => match File::open(&file_path) {
                    Ok(file) if file_path.is_file() => request.respond(
                        typed(Response::from_file(file), mime_for(&file_path)),
                    ),
                    _ => request.respond(Response::from_string("not found").with_status_code(404)),
                },
            },
        };
        if let Err(e) = result {
            debug!("failed to respond: {e}");
        }
    }
}

/// Map a URL path under `root`, refusing anything that climbs out of it.
fn resolve(root: &Path, url_path: &str) -> Option<PathBuf> {
    let rel = Path::new(url_path.trim_start_matches('/'));
    let mut out = root.to_path_buf();
    for component in rel.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(out)
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html",
        Some("js") => "application/javascript",
        Some("css") => "text/css",
        Some("conf") | Some("txt") => "text/plain",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

fn typed<R: std::io::Read>(response: Response<R>, value: &str) -> Response<R> {
    match Header::from_bytes(&b"Content-Type"[..], value.as_bytes()) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}
