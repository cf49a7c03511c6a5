use ferry_core::{Error, Result, Value};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Number(String),
    Text(String),
    Placeholder(usize),
    Symbol(char),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    All,
    Columns(Vec<String>),
}

/// Column compared for equality with a value, conditions are joined by `AND`.
pub type Filter = Vec<(String, Value)>;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateTable {
        name: String,
        columns: Vec<String>,
        if_not_exists: bool,
    },
    DropTable {
        name: String,
        if_exists: bool,
    },
    Insert {
        table: String,
        columns: Option<Vec<String>>,
        rows: Vec<Vec<Value>>,
        returning: Option<Projection>,
    },
    Select {
        table: String,
        projection: Projection,
        filter: Filter,
        order_by: Option<(String, bool)>,
        limit: Option<usize>,
        offset: Option<usize>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Value)>,
        filter: Filter,
    },
    Delete {
        table: String,
        filter: Filter,
    },
    Begin,
    Commit,
    Rollback,
}

fn tokenize(sql: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '\'' | '"' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some(v) if v == c => {
                            if chars.peek() == Some(&c) {
                                chars.next();
                                value.push(c);
                            } else {
                                break;
                            }
                        }
                        Some(v) => value.push(v),
                        None => return Err(Error::msg(format!("Unterminated {} in `{}`", c, sql))),
                    }
                }
                tokens.push(if c == '\'' {
                    Token::Text(value)
                } else {
                    Token::Quoted(value)
                });
            }
            '$' => {
                chars.next();
                let mut digits = String::new();
                while let Some(d) = chars.peek().filter(|v| v.is_ascii_digit()) {
                    digits.push(*d);
                    chars.next();
                }
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| Error::msg(format!("Invalid placeholder in `{}`", sql)))?;
                tokens.push(Token::Placeholder(index));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut number = String::new();
                number.push(c);
                chars.next();
                while let Some(d) = chars.peek().filter(|v| v.is_ascii_digit() || **v == '.') {
                    number.push(*d);
                    chars.next();
                }
                tokens.push(Token::Number(number));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut word = String::new();
                while let Some(v) = chars.peek().filter(|v| v.is_alphanumeric() || **v == '_') {
                    word.push(*v);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
            '(' | ')' | ',' | '*' | '=' | ';' => {
                chars.next();
                tokens.push(Token::Symbol(c));
            }
            _ => return Err(Error::msg(format!("Unexpected character `{}` in `{}`", c, sql))),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    sql: &'a str,
    tokens: Vec<Token>,
    position: usize,
    params: &'a [Value],
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn error(&self, expected: &str) -> Error {
        Error::msg(format!(
            "Expected {} at token {} of `{}`",
            expected, self.position, self.sql
        ))
    }

    fn keyword(&mut self, keyword: &str) -> bool {
        let found = matches!(
            self.peek(),
            Some(Token::Word(word)) if word.eq_ignore_ascii_case(keyword)
        );
        if found {
            self.position += 1;
        }
        found
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(keyword))
        }
    }

    fn symbol(&mut self, symbol: char) -> bool {
        if self.peek() == Some(&Token::Symbol(symbol)) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: char) -> Result<()> {
        if self.symbol(symbol) {
            Ok(())
        } else {
            Err(self.error(&format!("`{}`", symbol)))
        }
    }

    fn identifier(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Word(v)) | Some(Token::Quoted(v)) => Ok(v),
            _ => Err(self.error("an identifier")),
        }
    }

    fn identifiers(&mut self) -> Result<Vec<String>> {
        let mut result = vec![self.identifier()?];
        while self.symbol(',') {
            result.push(self.identifier()?);
        }
        Ok(result)
    }

    fn value(&mut self) -> Result<Value> {
        match self.next() {
            Some(Token::Number(v)) => {
                if v.contains('.') {
                    v.parse::<f64>()
                        .map(|v| Value::Float64(Some(v)))
                        .map_err(|_| self.error("a number"))
                } else {
                    v.parse::<i64>()
                        .map(|v| Value::Int64(Some(v)))
                        .map_err(|_| self.error("a number"))
                }
            }
            Some(Token::Text(v)) => Ok(Value::Varchar(Some(v))),
            Some(Token::Placeholder(i)) => i
                .checked_sub(1)
                .and_then(|i| self.params.get(i))
                .cloned()
                .ok_or_else(|| {
                    Error::msg(format!(
                        "Placeholder ${} has no bound value ({} given)",
                        i,
                        self.params.len()
                    ))
                }),
            Some(Token::Word(v)) if v.eq_ignore_ascii_case("NULL") => Ok(Value::Null),
            Some(Token::Word(v)) if v.eq_ignore_ascii_case("TRUE") => Ok(Value::Boolean(Some(true))),
            Some(Token::Word(v)) if v.eq_ignore_ascii_case("FALSE") => {
                Ok(Value::Boolean(Some(false)))
            }
            _ => Err(self.error("a value")),
        }
    }

    fn values(&mut self) -> Result<Vec<Value>> {
        self.expect_symbol('(')?;
        let mut result = vec![self.value()?];
        while self.symbol(',') {
            result.push(self.value()?);
        }
        self.expect_symbol(')')?;
        Ok(result)
    }

    fn count(&mut self) -> Result<usize> {
        match self.next() {
            Some(Token::Number(v)) => v.parse::<usize>().map_err(|_| self.error("a count")),
            Some(Token::Placeholder(i)) => match i.checked_sub(1).and_then(|i| self.params.get(i)) {
                Some(Value::Int64(Some(v))) if *v >= 0 => Ok(*v as usize),
                Some(Value::Int32(Some(v))) if *v >= 0 => Ok(*v as usize),
                Some(Value::UInt64(Some(v))) => Ok(*v as usize),
                _ => Err(self.error("a count")),
            },
            _ => Err(self.error("a count")),
        }
    }

    fn projection(&mut self) -> Result<Projection> {
        if self.symbol('*') {
            Ok(Projection::All)
        } else {
            Ok(Projection::Columns(self.identifiers()?))
        }
    }

    fn filter(&mut self) -> Result<Filter> {
        let mut filter = Vec::new();
        if !self.keyword("WHERE") {
            return Ok(filter);
        }
        loop {
            let column = self.identifier()?;
            self.expect_symbol('=')?;
            filter.push((column, self.value()?));
            if !self.keyword("AND") {
                break;
            }
        }
        Ok(filter)
    }

    fn end(&mut self) -> Result<()> {
        self.symbol(';');
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.error("the end of the statement")),
        }
    }

    fn create(&mut self) -> Result<Command> {
        self.expect_keyword("TABLE")?;
        let if_not_exists = if self.keyword("IF") {
            self.expect_keyword("NOT")?;
            self.expect_keyword("EXISTS")?;
            true
        } else {
            false
        };
        let name = self.identifier()?;
        self.expect_symbol('(')?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.identifier()?);
            // Skip the column type and constraints
            let mut depth = 0;
            loop {
                match self.peek() {
                    Some(Token::Symbol(',')) | Some(Token::Symbol(')')) if depth == 0 => break,
                    Some(Token::Symbol('(')) => depth += 1,
                    Some(Token::Symbol(')')) => depth -= 1,
                    None => return Err(self.error("`)`")),
                    _ => {}
                }
                self.position += 1;
            }
            if !self.symbol(',') {
                break;
            }
        }
        self.expect_symbol(')')?;
        Ok(Command::CreateTable {
            name,
            columns,
            if_not_exists,
        })
    }

    fn drop_table(&mut self) -> Result<Command> {
        self.expect_keyword("TABLE")?;
        let if_exists = if self.keyword("IF") {
            self.expect_keyword("EXISTS")?;
            true
        } else {
            false
        };
        Ok(Command::DropTable {
            name: self.identifier()?,
            if_exists,
        })
    }

    fn insert(&mut self) -> Result<Command> {
        self.expect_keyword("INTO")?;
        let table = self.identifier()?;
        let columns = if self.symbol('(') {
            let columns = self.identifiers()?;
            self.expect_symbol(')')?;
            Some(columns)
        } else {
            None
        };
        self.expect_keyword("VALUES")?;
        let mut rows = vec![self.values()?];
        while self.symbol(',') {
            rows.push(self.values()?);
        }
        let returning = if self.keyword("RETURNING") {
            Some(self.projection()?)
        } else {
            None
        };
        Ok(Command::Insert {
            table,
            columns,
            rows,
            returning,
        })
    }

    fn select(&mut self) -> Result<Command> {
        let projection = self.projection()?;
        self.expect_keyword("FROM")?;
        let table = self.identifier()?;
        let filter = self.filter()?;
        let order_by = if self.keyword("ORDER") {
            self.expect_keyword("BY")?;
            let column = self.identifier()?;
            let descending = self.keyword("DESC");
            if !descending {
                self.keyword("ASC");
            }
            Some((column, descending))
        } else {
            None
        };
        let limit = if self.keyword("LIMIT") {
            Some(self.count()?)
        } else {
            None
        };
        let offset = if self.keyword("OFFSET") {
            Some(self.count()?)
        } else {
            None
        };
        Ok(Command::Select {
            table,
            projection,
            filter,
            order_by,
            limit,
            offset,
        })
    }

    fn update(&mut self) -> Result<Command> {
        let table = self.identifier()?;
        self.expect_keyword("SET")?;
        let mut assignments = Vec::new();
        loop {
            let column = self.identifier()?;
            self.expect_symbol('=')?;
            assignments.push((column, self.value()?));
            if !self.symbol(',') {
                break;
            }
        }
        Ok(Command::Update {
            table,
            assignments,
            filter: self.filter()?,
        })
    }

    fn delete(&mut self) -> Result<Command> {
        self.expect_keyword("FROM")?;
        Ok(Command::Delete {
            table: self.identifier()?,
            filter: self.filter()?,
        })
    }
}

/// Parse one statement, replacing the placeholders with `params`.
pub fn parse(sql: &str, params: &[Value]) -> Result<Command> {
    let mut parser = Parser {
        sql,
        tokens: tokenize(sql)?,
        position: 0,
        params,
    };
    let command = if parser.keyword("CREATE") {
        parser.create()?
    } else if parser.keyword("DROP") {
        parser.drop_table()?
    } else if parser.keyword("INSERT") {
        parser.insert()?
    } else if parser.keyword("SELECT") {
        parser.select()?
    } else if parser.keyword("UPDATE") {
        parser.update()?
    } else if parser.keyword("DELETE") {
        parser.delete()?
    } else if parser.keyword("BEGIN") {
        Command::Begin
    } else if parser.keyword("COMMIT") {
        Command::Commit
    } else if parser.keyword("ROLLBACK") {
        Command::Rollback
    } else {
        return Err(parser.error("a statement"));
    };
    parser.end()?;
    Ok(command)
}
