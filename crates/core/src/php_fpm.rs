//! Per-site PHP-FPM pool rendering.
//!
//! Each PHP site gets its own pool running as the site's system user, so
//! one tenant's PHP code cannot read another tenant's files.

use crate::shell::quote;

/// Functions disabled in every pool.
pub const DISABLED_FUNCTIONS: &str = "exec,passthru,shell_exec,system,proc_open,popen,curl_exec,curl_multi_exec,parse_ini_file,show_source,pcntl_exec";

/// Location of a site's pool file.
pub fn pool_path(php_version: &str, domain: &str) -> String {
    format!("/etc/php/{php_version}/fpm/pool.d/{domain}.conf")
}

/// Socket the site's pool listens on.
pub fn socket_path(php_version: &str, system_user: &str) -> String {
    format!("/run/php/php{php_version}-fpm-{system_user}.sock")
}

/// Everything needed to render one pool file.
#[derive(Debug, Clone)]
pub struct Pool<'a> {
    pub domain: &'a str,
    pub system_user: &'a str,
    pub php_version: &'a str,
    /// Parent of the site's home directory, e.g. `/var/www`.
    pub web_root: &'a str,
}

impl Pool<'_> {
    pub fn render(&self) -> String {
        let web_root = self.web_root.trim_end_matches('/');
        let v = self.php_version;
        format!(
            "[{domain}]\n\
             user = {user}\n\
             group = www-data\n\
             listen = {socket}\n\
             listen.owner = www-data\n\
             listen.group = www-data\n\
             listen.mode = 0660\n\
             \n\
             pm = dynamic\n\
             pm.max_children = 5\n\
             pm.start_servers = 2\n\
             pm.min_spare_servers = 1\n\
             pm.max_spare_servers = 3\n\
             \n\
             php_admin_value[disable_functions] = {DISABLED_FUNCTIONS}\n\
             php_admin_value[open_basedir] = {web_root}/{user}:/tmp:/usr/share/php\n\
             php_admin_value[error_log] = /var/log/php{v}-fpm-{domain}.log\n\
             php_admin_flag[log_errors] = on\n\
             php_admin_value[memory_limit] = 256M\n\
             php_admin_value[max_execution_time] = 300\n\
             php_admin_value[upload_max_filesize] = 64M\n\
             php_admin_value[post_max_size] = 64M\n",
            domain = self.domain,
            user = self.system_user,
            socket = socket_path(v, self.system_user),
        )
    }
}

/// Validates the pool set and reloads the service. A pool that fails
/// validation is removed so the service keeps loading.
pub fn install_command(php_version: &str, domain: &str) -> String {
    let path = quote(&pool_path(php_version, domain));
    format!(
        "chmod 644 {path} && (php-fpm{php_version} -t || {{ rm -f {path}; exit 1; }}) && systemctl reload php{php_version}-fpm"
    )
}

/// Removes the pool and reloads the service.
pub fn remove_command(php_version: &str, domain: &str) -> String {
    format!(
        "rm -f {} && systemctl reload php{php_version}-fpm",
        quote(&pool_path(php_version, domain))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Pool<'static> {
        Pool { domain: "a.com", system_user: "site_acom", php_version: "8.2", web_root: "/var/www/" }
    }

    #[test]
    fn pool_runs_as_the_site_user_on_its_own_socket() {
        let conf = pool().render();
        assert!(conf.starts_with("[a.com]\n"));
        assert!(conf.contains("user = site_acom\n"));
        assert!(conf.contains("listen = /run/php/php8.2-fpm-site_acom.sock\n"));
        assert!(conf.contains("open_basedir] = /var/www/site_acom:/tmp:/usr/share/php\n"));
        assert!(conf.contains("shell_exec"));
    }

    #[test]
    fn broken_pool_is_removed_before_any_reload() {
        let cmd = install_command("8.2", "a.com");
        let test = cmd.find("php-fpm8.2 -t").unwrap();
        let remove = cmd.find("rm -f /etc/php/8.2/fpm/pool.d/a.com.conf").unwrap();
        let reload = cmd.find("systemctl reload php8.2-fpm").unwrap();
        assert!(test < remove && remove < reload);
        assert_eq!(
            remove_command("8.2", "a.com"),
            "rm -f /etc/php/8.2/fpm/pool.d/a.com.conf && systemctl reload php8.2-fpm"
        );
    }
}
