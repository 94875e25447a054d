use glean::{Document, LoadOptions};

fn main() {
    let mut mode = "text";
    let mut path: Option<String> = None;
    let mut options = LoadOptions::default();

    for arg in std::env::args().skip(1) {
        if let Some(flag) = arg.strip_prefix("--") {
            match flag {
                "text" => mode = "text",
                "markdown" => mode = "markdown",
                "lines" => mode = "lines",
                "metadata" => mode = "metadata",
                "keep-placeholders" => options.strip_form_placeholders = false,
                "invisible" => options.include_invisible_text = true,
                other => {
                    eprintln!("unknown flag --{}", other);
                    std::process::exit(2);
                }
            }
        } else {
            path = Some(arg);
        }
    }

    let Some(path) = path else {
        eprintln!("usage: glean [--text|--markdown|--lines|--metadata] <file.pdf>");
        std::process::exit(2);
    };

    let data = match std::fs::read(&path) {
        Ok(data) => data,
        Err(err) => {
            eprintln!("failed to load {}: {}", path, err);
            std::process::exit(2);
        }
    };
    let doc = match Document::parse_with_options(data, options) {
        Ok(doc) => doc,
        Err(err) => {
            eprintln!("failed to parse {}: {}", path, err);
            std::process::exit(2);
        }
    };

    match mode {
        "markdown" => println!("{}", doc.markdown()),
        "lines" => {
            for index in 0..doc.page_count() {
                match doc.page_lines(index) {
                    Ok(lines) => {
                        for line in lines {
                            println!(
                                "page={} y={:.2} size={:.1} text={:?}",
                                index + 1,
                                line.y,
                                line.font_size,
                                line.text
                            );
                        }
                    }
                    Err(err) => eprintln!("page {}: {}", index + 1, err),
                }
            }
        }
        "metadata" => {
            let meta = doc.metadata();
            println!("pages: {}", meta.page_count);
            let fields = [
                ("title", &meta.title),
                ("author", &meta.author),
                ("subject", &meta.subject),
                ("keywords", &meta.keywords),
                ("creator", &meta.creator),
                ("producer", &meta.producer),
                ("created", &meta.creation_date),
                ("modified", &meta.mod_date),
            ];
            for (label, value) in fields {
                if let Some(value) = value {
                    println!("{}: {}", label, value);
                }
            }
        }
        _ => println!("{}", doc.text()),
    }
}
