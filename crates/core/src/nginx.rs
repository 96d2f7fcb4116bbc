//! Nginx server-block rendering.

use serde::Serialize;

/// How a site is currently being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServeMode {
    /// Normal traffic to the document root.
    Live,
    /// Every request gets a 403 "suspended" page.
    Suspended,
    /// Every request gets a 503 "maintenance" page (used during restores).
    Maintenance,
}

/// Certificate and key paths for a TLS-enabled block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TlsPaths {
    pub certificate: String,
    pub private_key: String,
}

impl TlsPaths {
    /// Paths certbot writes for `domain`.
    pub fn letsencrypt(domain: &str) -> Self {
        Self {
            certificate: format!("/etc/letsencrypt/live/{domain}/fullchain.pem"),
            private_key: format!("/etc/letsencrypt/live/{domain}/privkey.pem"),
        }
    }
}

/// Everything needed to render one site's configuration file.
#[derive(Debug, Clone)]
pub struct ServerBlock {
    pub domain: String,
    pub document_root: String,
    /// PHP-FPM socket, for sites that run PHP.
    pub php_socket: Option<String>,
    pub tls: Option<TlsPaths>,
    pub mode: ServeMode,
}

/// Access log for a domain.
pub fn access_log_path(domain: &str) -> String {
    format!("/var/log/nginx/{domain}_access.log")
}

/// Error log for a domain.
pub fn error_log_path(domain: &str) -> String {
    format!("/var/log/nginx/{domain}_error.log")
}

/// Location of a site's configuration file.
pub fn config_path(conf_dir: &str, domain: &str) -> String {
    format!("{}/{domain}.conf", conf_dir.trim_end_matches('/'))
}

/// Validate-then-reload command. Never reloads a broken configuration.
pub const RELOAD_COMMAND: &str = "nginx -t && systemctl reload nginx";

impl ServerBlock {
    /// Render the full configuration file.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let names = format!("{0} www.{0}", self.domain);

        match &self.tls {
            Some(tls) => {
                out.push_str(&format!(
                    "server {{\n    listen 80;\n    listen [::]:80;\n    server_name {names};\n\n{}    location / {{\n        return 301 https://$host$request_uri;\n    }}\n}}\n\n",
                    self.acme_location()
                ));
                out.push_str(&format!(
                    "server {{\n    listen 443 ssl http2;\n    listen [::]:443 ssl http2;\n    server_name {names};\n\n    ssl_certificate {};\n    ssl_certificate_key {};\n    ssl_protocols TLSv1.2 TLSv1.3;\n    ssl_prefer_server_ciphers off;\n    add_header Strict-Transport-Security \"max-age=31536000\" always;\n\n{}}}\n",
                    tls.certificate,
                    tls.private_key,
                    self.body()
                ));
            }
            None => {
                out.push_str(&format!(
                    "server {{\n    listen 80;\n    listen [::]:80;\n    server_name {names};\n\n{}}}\n",
                    self.body()
                ));
            }
        }
        out
    }

    fn acme_location(&self) -> String {
        format!(
            "    location ^~ /.well-known/acme-challenge/ {{\n        root {};\n    }}\n\n",
            self.document_root
        )
    }

    fn body(&self) -> String {
        let mut body = format!(
            "    root {};\n    index index.php index.html index.htm;\n\n    access_log {};\n    error_log {};\n\n",
            self.document_root,
            access_log_path(&self.domain),
            error_log_path(&self.domain),
        );
        body.push_str(&self.acme_location());

        match self.mode {
            ServeMode::Suspended => body.push_str(
                "    location / {\n        default_type text/html;\n        return 403 '<h1>Site suspended</h1><p>This website has been suspended. Please contact support.</p>';\n    }\n",
            ),
            ServeMode::Maintenance => body.push_str(
                "    location / {\n        default_type text/html;\n        add_header Retry-After 300 always;\n        return 503 '<h1>Maintenance</h1><p>This website is being restored. Please check back shortly.</p>';\n    }\n",
            ),
            ServeMode::Live => {
                body.push_str("    client_max_body_size 64m;\n\n");
                match &self.php_socket {
                    Some(socket) => body.push_str(&format!(
                        "    location / {{\n        try_files $uri $uri/ /index.php?$args;\n    }}\n\n    location ~ \\.php$ {{\n        include snippets/fastcgi-php.conf;\n        fastcgi_pass unix:{socket};\n    }}\n\n    location ~ /\\.(?!well-known) {{\n        deny all;\n    }}\n"
                    )),
                    None => body.push_str(
                        "    location / {\n        try_files $uri $uri/ =404;\n    }\n\n    location ~ /\\.(?!well-known) {\n        deny all;\n    }\n",
                    ),
                }
            }
        }
        body
    }
}
