use clap::{Arg, Command};
use csv_async::{AsyncWriterBuilder, QuoteStyle};

const PROFESSIONS: [&str; 5] = [
    "Engineer",
    "Nurse",
    "Teacher, Primary",
    "Accountant",
    "Designer",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("gen")
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_parser(clap::value_parser!(u64))
                .required(true),
        )
        .arg(
            Arg::new("with_header")
                .long("with-header")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("malformed_every")
                .long("malformed-every")
                .help("Emit a four-column row after every N good rows")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("quoted")
                .long("quoted")
                .help("Quote every field, not only those containing commas")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let rows: u64 = matches.get_one::<u64>("rows").copied().unwrap_or(0);
    let with_header = matches.get_flag("with_header");
    let malformed_every = matches.get_one::<u64>("malformed_every").copied();
    let quote_style = if matches.get_flag("quoted") {
        QuoteStyle::Always
    } else {
        QuoteStyle::Necessary
    };

    let mut out = AsyncWriterBuilder::new()
        .quote_style(quote_style)
        .flexible(true)
        .create_writer(tokio::io::stdout());

    if with_header {
        out.write_record(["id", "firstname", "lastname", "email", "email2", "profession"])
            .await?;
    }

    // Deterministic data: ids count up, names and professions cycle
    for i in 0..rows {
        let id = i.to_string();
        let first = format!("First{i}");
        let last = format!("Last{i}");
        let email = format!("user{i}@example.com");
        let email2 = format!("user{i}@backup.example.com");
        let profession = PROFESSIONS[(i % PROFESSIONS.len() as u64) as usize];
        out.write_record([
            id.as_str(),
            first.as_str(),
            last.as_str(),
            email.as_str(),
            email2.as_str(),
            profession,
        ])
        .await?;

        if let Some(n) = malformed_every {
            if n > 0 && (i + 1) % n == 0 {
                out.write_record([id.as_str(), first.as_str(), last.as_str(), "missing-columns"])
                    .await?;
            }
        }
        if i % 10_000 == 0 {
            out.flush().await?;
        } // keep buffers moving on huge runs
    }

    out.flush().await?;
    Ok(())
}
