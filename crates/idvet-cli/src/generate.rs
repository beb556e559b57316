use std::io::Write;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const FIRST_NAMES: [&str; 12] = [
    "Ada", "Grace", "Alan", "Edsger", "Barbara", "Donald", "Frances", "John", "Margaret", "Dennis",
    "Radia", "Ken",
];
const LAST_NAMES: [&str; 10] = [
    "Lovelace", "Hopper", "Turing", "Dijkstra", "Liskov", "Knuth", "Allen", "Backus", "Hamilton",
    "Ritchie",
];
const STREETS: [&str; 6] = ["Main St", "Oak Ave", "Pine Rd", "Elm St", "Lake Dr", "Hill Ct"];
const CITIES: [(&str, &str); 5] = [
    ("Springfield", "IL"),
    ("Portland", "OR"),
    ("Austin", "TX"),
    ("Madison", "WI"),
    ("Boulder", "CO"),
];
const DOMAINS: [&str; 3] = ["example.com", "mail.test", "corp.example"];

/// Options for [`write_lines`].
#[derive(Clone, Debug)]
pub struct GenerateOptions {
    pub count: usize,
    pub duplicates: f64,
    pub malformed: f64,
    pub seed: u64,
}

struct Seed {
    name: String,
    email: String,
}

/// Write `count` standard-layout lines. A duplicate line reuses an earlier
/// line's name and email, with its own username, phone, and address.
pub fn write_lines(out: &mut impl Write, options: &GenerateOptions) -> anyhow::Result<()> {
    anyhow::ensure!(
        (0.0..=1.0).contains(&options.duplicates),
        "duplicates must be between 0 and 1"
    );
    anyhow::ensure!(
        (0.0..=1.0).contains(&options.malformed),
        "malformed must be between 0 and 1"
    );

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut seen: Vec<Seed> = Vec::new();

    for i in 0..options.count {
        let reuse = !seen.is_empty() && rng.gen_bool(options.duplicates);
        let (name, email) = if reuse {
            let earlier = &seen[rng.gen_range(0..seen.len())];
            (earlier.name.clone(), earlier.email.clone())
        } else {
            let first = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())];
            let last = LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())];
            let domain = DOMAINS[rng.gen_range(0..DOMAINS.len())];
            let email = format!("{}.{}{}@{}", first.to_lowercase(), last.to_lowercase(), i, domain);
            let name = format!("{first} {last}");
            seen.push(Seed {
                name: name.clone(),
                email: email.clone(),
            });
            (name, email)
        };

        let phone = format!(
            "({:03}) {:03}-{:04}",
            rng.gen_range(200..1000),
            rng.gen_range(0..1000),
            rng.gen_range(0..10_000)
        );
        let street = format!(
            "{} {}",
            rng.gen_range(1..2000),
            STREETS[rng.gen_range(0..STREETS.len())]
        );
        let (city, state) = CITIES[rng.gen_range(0..CITIES.len())];
        let zip = format!("{:05}", rng.gen_range(10_000..100_000));
        let age: u32 = rng.gen_range(18..90);
        let mut columns = vec![
            format!("user{i}"),
            format!("pw{:06}", rng.gen_range(0..1_000_000)),
            name,
            phone,
            email,
            street,
            city.to_string(),
            state.to_string(),
            zip,
            age.to_string(),
        ];
        if rng.gen_bool(options.malformed) {
            columns.pop();
        }
        writeln!(out, "{}", columns.join("\t"))?;
    }
    Ok(())
}
