pub mod mysql;
pub mod postgres;
pub mod query;

/// Builds a driver connection URL from the mapping's connection fields plus
/// the password resolved at run start from the external secret store (§3:
/// "the resolved plaintext lives only for the duration of the run").
pub fn connection_url(
    driver: model::mapping::RelationalDriver,
    host: &str,
    port: u16,
    db: &str,
    user: &str,
    password: &str,
) -> String {
    use model::mapping::RelationalDriver;
    let scheme = match driver {
        RelationalDriver::Mysql => "mysql",
        RelationalDriver::Postgres => "postgresql",
    };
    format!(
        "{scheme}://{user}:{password}@{host}:{port}/{db}",
        password = urlencode(password),
    )
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
