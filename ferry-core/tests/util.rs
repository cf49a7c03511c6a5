#[cfg(test)]
mod tests {
    use ferry_core::{Statement, floor_char_boundary};

    #[test]
    fn char_boundary() {
        let text = "abcé";
        assert_eq!(floor_char_boundary(text, 2), 2);
        assert_eq!(floor_char_boundary(text, 4), 3);
        assert_eq!(floor_char_boundary(text, 5), 5);
        assert_eq!(floor_char_boundary(text, 100), 5);
        assert_eq!(floor_char_boundary("", 0), 0);
    }

    #[test]
    fn long_statement_display() {
        let sql = format!("{}{}", "x".repeat(496), "ü".repeat(10));
        let shown = Statement::new(sql).to_string();
        assert!(shown.ends_with("..."));
        assert_eq!(shown.trim_end_matches("...").len(), 496);

        let short = Statement::new("SELECT 1").to_string();
        assert_eq!(short, "SELECT 1");
    }
}
