#[cfg(test)]
mod tests {
    use ferry_core::{
        DEFAULT_MAX_CONNECTIONS, DEFAULT_MIN_CONNECTIONS, DatabaseConfig, DbError, is_db_error,
    };

    #[test]
    fn from_url() {
        let config = DatabaseConfig::from_url(
            "postgres://db.example.com/inventory?max_connections=4&min_connections=2&autocommit=false&sslmode=require",
        )
        .expect("Could not parse the URL");
        assert_eq!(config.driver, "postgres");
        assert_eq!(config.host, "db.example.com");
        assert_eq!(config.database, "inventory");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.min_connections, 2);
        assert!(!config.autocommit);
        assert_eq!(config.option("sslmode"), Some("require"));
        assert_eq!(config.option("max_connections"), None);
    }

    #[test]
    fn defaults() {
        let config = DatabaseConfig::new("memory", "scratch");
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.min_connections, DEFAULT_MIN_CONNECTIONS);
        assert!(config.autocommit);
        assert!(config.validate().is_ok());

        let config = DatabaseConfig::from_url("memory://localhost/my%20db?named_cursors=true")
            .expect("Could not parse the URL");
        assert_eq!(config.database, "my db");
        assert_eq!(config.option("named_cursors"), Some("true"));
    }

    #[test]
    fn invalid() {
        let error = DatabaseConfig::from_url("memory://localhost/db?max_connections=zero")
            .expect_err("The connections must be a number");
        assert!(is_db_error(&error, |e| matches!(e, DbError::Configuration(..))));
        assert!(format!("{:#}", error).contains("max_connections"));

        let error = DatabaseConfig::from_url("memory://localhost/db?autocommit=maybe")
            .expect_err("Autocommit is a boolean");
        assert!(is_db_error(&error, |e| matches!(e, DbError::Configuration(..))));

        let error = DatabaseConfig::new("memory", "db")
            .max_connections(2)
            .min_connections(3)
            .validate()
            .expect_err("The minimum cannot exceed the maximum");
        assert!(format!("{:#}", error).contains("cannot exceed"));

        assert!(
            DatabaseConfig::new("memory", "db")
                .max_connections(0)
                .min_connections(0)
                .validate()
                .is_err()
        );
        assert!(DatabaseConfig::from_url("not a url").is_err());
    }
}
