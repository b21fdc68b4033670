use super::{DatabaseSettings, SettingsError};
use crate::dialect::Dialect;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

fn query_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

impl DatabaseSettings {
    /// Parsed driver. There is no default: an empty driver is an error.
    pub fn dialect(&self) -> Result<Dialect, SettingsError> {
        if self.driver.trim().is_empty() {
            return Err(SettingsError::MissingDriver);
        }
        self.driver
            .parse()
            .map_err(|_| SettingsError::UnknownDriver(self.driver.clone()))
    }

    /// Driver connection string in the format each driver expects.
    pub fn dsn(&self) -> Result<String, SettingsError> {
        Ok(match self.dialect()? {
            Dialect::Mysql => format!(
                "{}:{}@tcp({}:{})/{}?parseTime=true&loc={}",
                self.user,
                self.password,
                self.host,
                self.port,
                self.name,
                query_escape(&self.timezone)
            ),
            Dialect::Postgres => format!(
                "dbname={} host={} port={} user={} password={} sslmode={} TimeZone={}",
                self.name, self.host, self.port, self.user, self.password, self.ssl_mode, self.timezone
            ),
            Dialect::Sqlserver => format!(
                "sqlserver://{}:{}@{}:{}?database={}",
                self.user, self.password, self.host, self.port, self.name
            ),
            Dialect::Firebird => format!(
                "{}:{}@{}:{}/{}?charset={}",
                self.user, self.password, self.host, self.port, self.name, self.charset
            ),
            Dialect::Clickhouse => format!(
                "tcp://{}:{}?database={}&username={}&password={}",
                self.host, self.port, self.name, self.user, self.password
            ),
            Dialect::Sqlite => self.path.clone(),
        })
    }

    /// Structured connect options for the PostgreSQL pool.
    pub fn pg_connect_options(&self) -> Result<PgConnectOptions, SettingsError> {
        if self.dialect()? != Dialect::Postgres {
            return Err(SettingsError::UnknownDriver(self.driver.clone()));
        }
        let ssl_mode: PgSslMode = self.ssl_mode.parse().map_err(|e: sqlx::Error| SettingsError::Invalid {
            name: "DB_SSLMODE".into(),
            message: e.to_string(),
        })?;
        Ok(PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
            .ssl_mode(ssl_mode)
            .options([("TimeZone", self.timezone.as_str())]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn db(driver: &str) -> DatabaseSettings {
        DatabaseSettings {
            driver: driver.into(),
            host: "db".into(),
            port: 5432,
            user: "app".into(),
            password: "pw".into(),
            name: "main".into(),
            ssl_mode: "disable".into(),
            timezone: "Asia/Jakarta".into(),
            path: "/data/app.db".into(),
            ..DatabaseSettings::default()
        }
    }

    #[test]
    fn dsn_per_driver() {
        assert_eq!(
            db("postgres").dsn().unwrap(),
            "dbname=main host=db port=5432 user=app password=pw sslmode=disable TimeZone=Asia/Jakarta"
        );
        assert_eq!(
            db("mysql").dsn().unwrap(),
            "app:pw@tcp(db:5432)/main?parseTime=true&loc=Asia%2FJakarta"
        );
        assert_eq!(db("mssql").dsn().unwrap(), "sqlserver://app:pw@db:5432?database=main");
        assert_eq!(db("firebird").dsn().unwrap(), "app:pw@db:5432/main?charset=UTF8");
        assert_eq!(
            db("clickhouse").dsn().unwrap(),
            "tcp://db:5432?database=main&username=app&password=pw"
        );
        assert_eq!(db("sqlite").dsn().unwrap(), "/data/app.db");
    }

    #[test]
    fn driver_is_required() {
        assert!(matches!(db("").dsn(), Err(SettingsError::MissingDriver)));
        assert!(matches!(db("oracle").dsn(), Err(SettingsError::UnknownDriver(_))));
    }
}
