use std::fmt;
use std::io::BufRead;
use std::str::FromStr;
use std::sync::Arc;

use idvet_types::{Address, ContactDetails, IdGenerator, Identity, Password, Person};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{IngestError, IngestResult};

/// Column layout of a tab-separated identity line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    /// username, password, name, phone, email, street, city, state, zip, age
    #[default]
    Standard,
    /// username, password, first, last, phone, email, street, city, state, zip, age
    SplitName,
    /// username, name, phone, email, street, city, state, zip, age
    NoPassword,
    /// Whichever of the three layouts has exactly as many columns as the line.
    Auto,
}

impl Layout {
    pub const CONCRETE: [Layout; 3] = [Layout::Standard, Layout::SplitName, Layout::NoPassword];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layout::Standard => "standard",
            Layout::SplitName => "split-name",
            Layout::NoPassword => "no-password",
            Layout::Auto => "auto",
        }
    }

    /// Number of columns the layout reads; `None` for [`Layout::Auto`].
    pub fn field_count(&self) -> Option<usize> {
        match self {
            Layout::Standard => Some(10),
            Layout::SplitName => Some(11),
            Layout::NoPassword => Some(9),
            Layout::Auto => None,
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layout {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Layout::Standard, Layout::SplitName, Layout::NoPassword, Layout::Auto]
            .into_iter()
            .find(|layout| layout.as_str() == s)
            .ok_or_else(|| IngestError::Config(format!("unknown layout '{s}'")))
    }
}

/// Columns of one line, already split into named fields.
struct Fields<'a> {
    username: &'a str,
    password: &'a str,
    name: String,
    phone: &'a str,
    email: &'a str,
    street: &'a str,
    city: &'a str,
    state: &'a str,
    zip: &'a str,
    age: &'a str,
}

fn split_fields<'a>(parts: &[&'a str], layout: Layout) -> Result<Fields<'a>, String> {
    let expected = layout.field_count().unwrap_or(0);
    if parts.len() < expected {
        return Err(format!(
            "expected {expected} fields for {layout} layout, found {}",
            parts.len()
        ));
    }
    let fields = match layout {
        Layout::Standard => Fields {
            username: parts[0],
            password: parts[1],
            name: parts[2].to_string(),
            phone: parts[3],
            email: parts[4],
            street: parts[5],
            city: parts[6],
            state: parts[7],
            zip: parts[8],
            age: parts[9],
        },
        Layout::SplitName => Fields {
            username: parts[0],
            password: parts[1],
            name: format!("{} {}", parts[2], parts[3]),
            phone: parts[4],
            email: parts[5],
            street: parts[6],
            city: parts[7],
            state: parts[8],
            zip: parts[9],
            age: parts[10],
        },
        Layout::NoPassword => Fields {
            username: parts[0],
            password: "",
            name: parts[1].to_string(),
            phone: parts[2],
            email: parts[3],
            street: parts[4],
            city: parts[5],
            state: parts[6],
            zip: parts[7],
            age: parts[8],
        },
        Layout::Auto => return Err("auto layout must be resolved first".into()),
    };
    Ok(fields)
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Parse one line. Never fails: unparseable input becomes the malformed
/// sentinel carrying the reason.
pub fn parse_line(line: &str, line_no: usize, layout: Layout, ids: &IdGenerator) -> Identity {
    let parts: Vec<&str> = line.split('\t').map(str::trim).collect();
    let layout = match layout {
        Layout::Auto => match Layout::CONCRETE
            .into_iter()
            .find(|l| l.field_count() == Some(parts.len()))
        {
            Some(found) => found,
            None => {
                return Identity::malformed(
                    line_no,
                    line,
                    format!("no layout has {} fields", parts.len()),
                )
            }
        },
        concrete => concrete,
    };

    let fields = match split_fields(&parts, layout) {
        Ok(fields) => fields,
        Err(reason) => return Identity::malformed(line_no, line, reason),
    };
    let age = match fields.age.parse::<u32>() {
        Ok(age) => age,
        Err(_) => {
            return Identity::malformed(line_no, line, format!("invalid age '{}'", fields.age))
        }
    };

    let address = Address::new(ids, fields.street, fields.city, fields.state, fields.zip);
    Identity::Person(Person::new(
        ids.next_identity_id(),
        fields.username,
        Password::new(fields.password),
        fields.name,
        age,
        ContactDetails::new(
            optional(fields.phone),
            optional(fields.email),
            vec![Arc::new(address)],
        ),
    ))
}

/// Reads identities line by line from a buffered source.
///
/// Blank lines are skipped. The reader yields `None` at end of input; an I/O
/// error is yielded once and ends the stream.
pub struct IdentityReader<R> {
    source: R,
    layout: Layout,
    ids: Arc<IdGenerator>,
    line_no: usize,
    done: bool,
    buf: String,
}

impl<R: BufRead> IdentityReader<R> {
    pub fn new(source: R, layout: Layout, ids: Arc<IdGenerator>) -> Self {
        Self {
            source,
            layout,
            ids,
            line_no: 0,
            done: false,
            buf: String::new(),
        }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Lines consumed so far, including blank ones.
    pub fn lines_read(&self) -> usize {
        self.line_no
    }

    pub fn next_identity(&mut self) -> IngestResult<Option<Identity>> {
        while !self.done {
            self.buf.clear();
            let read = self.source.read_line(&mut self.buf).map_err(|source| {
                self.done = true;
                warn!(line = self.line_no + 1, error = %source, "read failed");
                IngestError::Io {
                    line: self.line_no + 1,
                    source,
                }
            })?;
            if read == 0 {
                self.done = true;
                debug!(lines = self.line_no, "end of input");
                break;
            }
            self.line_no += 1;
            let line = self.buf.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }
            return Ok(Some(parse_line(line, self.line_no, self.layout, &self.ids)));
        }
        Ok(None)
    }
}

impl<R: BufRead> Iterator for IdentityReader<R> {
    type Item = IngestResult<Identity>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_identity().transpose()
    }
}
