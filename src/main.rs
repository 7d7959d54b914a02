use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use colorindex::*;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

// Reads colored unitigs from FASTA. The header of each record lists the colors of
// the unitig as whitespace-separated integers.
fn read_colored_unitigs(infile: &Path) -> CliResult<Vec<(Vec<u8>, Vec<Color>)>> {
    let mut reader = jseqio::reader::DynamicFastXReader::from_file(&infile)?;
    let mut unitigs = Vec::new();
    while let Some(rec) = reader.read_next()? {
        let header = std::str::from_utf8(rec.head)?;
        let mut colors = header.split_whitespace().map(|tok| tok.parse::<Color>())
            .collect::<Result<Vec<Color>, _>>()
            .map_err(|e| format!("bad color list in header \"{}\" of record {}: {}", header, unitigs.len(), e))?;
        colors.sort_unstable();
        colors.dedup();
        unitigs.push((rec.seq.to_vec(), colors));
    }
    Ok(unitigs)
}

fn read_filenames(path: &Path) -> CliResult<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text.lines().filter(|line| !line.is_empty()).map(|line| line.to_string()).collect())
}

fn build_command(matches: &clap::ArgMatches) -> CliResult<()> {
    let infile = matches.get_one::<PathBuf>("input").ok_or("input missing")?;
    let out_prefix = matches.get_one::<PathBuf>("output-prefix").ok_or("output prefix missing")?;
    let n_threads = *matches.get_one::<usize>("threads").ok_or("threads missing")?;
    let k = *matches.get_one::<usize>("k").ok_or("k missing")?;
    let temp_dir = matches.get_one::<PathBuf>("temp-dir").ok_or("temp dir missing")?;
    let encoding = *matches.get_one::<ColorSetEncoding>("encoding").ok_or("encoding missing")?;
    let buffer_bytes = matches.get_one::<usize>("buffer-bytes").copied();
    let check = matches.get_flag("check");
    let forward_only = matches.get_flag("forward-only");
    let stats_json = matches.get_flag("stats-json");

    log::info!("Reading colored unitigs from {}", infile.display());
    let unitigs = read_colored_unitigs(infile)?;
    let max_color = unitigs.iter().filter_map(|(_, colors)| colors.last().copied()).max();
    let num_colors = match matches.get_one::<u32>("num-colors") {
        Some(&n) => n,
        None => max_color.map_or(1, |c| c + 1),
    };
    log::info!("{} unitigs, {} colors", unitigs.len(), num_colors);

    let mut source = VecColoredUnitigs::new(num_colors, unitigs);
    if let Some(path) = matches.get_one::<PathBuf>("filenames") {
        source = source.with_filenames(read_filenames(path)?);
    }

    let file_base_name = out_prefix.file_name().map_or("colorindex".to_string(), |name| name.to_string_lossy().into_owned());
    let config = BuildConfiguration {
        num_colors,
        num_threads: n_threads,
        buffer_bytes,
        tmp_dirname: temp_dir.clone(),
        file_base_name,
        k,
        canonical: !forward_only,
        check,
        encoding,
    };

    let dictionary_builder = HashDictionaryBuilder::from_config(&config);
    let built = build_color_index(config, dictionary_builder, &source, std::sync::Arc::new(LogObserver))?;

    if let Some(report) = built.verification.as_ref() {
        if report.is_ok() {
            log::info!("Index verified");
        } else {
            log::warn!("Verification found {} mismatches", report.mismatches.len());
        }
    }

    // PathBuf can only set the extension, which would replace an existing one
    let mut outfile = out_prefix.clone().into_os_string();
    outfile.push(".colors");
    let outfile = PathBuf::from(outfile);

    log::info!("Writing to {}", outfile.display());
    let mut out = std::io::BufWriter::new(std::fs::File::create(&outfile)?);
    let n_written = write_color_index_variant(&built.colors, &mut out)?;
    out.flush()?;
    log::info!("Index size: {}", human_bytes::human_bytes(n_written as f64));

    if stats_json {
        println!("{}", serde_json::to_string_pretty(&built.stats)?);
    }

    Ok(())
}

fn inspect_command(matches: &clap::ArgMatches) -> CliResult<()> {
    let indexfile = matches.get_one::<PathBuf>("input").ok_or("input missing")?;
    let mut index_reader = std::io::BufReader::new(std::fs::File::open(indexfile)?);
    let index = load_color_index_variant(&mut index_reader)?;

    let mut stdout = std::io::BufWriter::new(std::io::stdout());
    writeln!(stdout, "encoding\t{}", String::from_utf8_lossy(index.type_id()))?;
    writeln!(stdout, "unitigs\t{}", index.num_unitigs())?;
    writeln!(stdout, "color sets\t{}", index.num_color_sets())?;
    writeln!(stdout, "colors\t{}", index.num_colors())?;
    writeln!(stdout, "color set bits\t{}", index.color_sets_num_bits())?;
    writeln!(stdout, "reference names\t{}", index.filenames().len())?;

    if let Some(&unitig_id) = matches.get_one::<usize>("unitig") {
        if unitig_id >= index.num_unitigs() {
            return Err(format!("unitig {} out of range ({} unitigs)", unitig_id, index.num_unitigs()).into());
        }
        let colors = index.colors_of_unitig(unitig_id);
        let colors_string = colors.iter().map(|c| c.to_string()).collect::<Vec<String>>().join(" ");
        writeln!(stdout, "unitig {}\tcolor set {}\t{}", unitig_id, index.color_set_id(unitig_id), colors_string)?;
        for &c in colors.iter() {
            if let Some(name) = index.filenames().get(c as usize) {
                writeln!(stdout, "\t{}\t{}", c, name)?;
            }
        }
    }
    stdout.flush()?;
    Ok(())
}

fn main() {

    let cli = clap::Command::new("colorindex")
        .about("Builds and inspects color-set indexes of colored compacted de Bruijn graphs.")
        .arg_required_else_help(true)
        .arg(clap::Arg::new("threads")
            .help("Number of encoder threads to use")
            .long("threads")
            .short('t')
            .default_value("4")
            .global(true)
            .value_parser(clap::value_parser!(usize))
        )
        .arg(clap::Arg::new("verbose")
            .help("Print more information when running.")
            .short('v')
            .long("verbose")
            .global(true)
            .action(clap::ArgAction::SetTrue)
        )
        .subcommand(clap::Command::new("build")
            .about("Build the color-set index of a set of colored unitigs")
            .arg_required_else_help(true)
            .arg(clap::Arg::new("input")
                .help("Unitigs in FASTA format. The header of each record lists the colors of the unitig as whitespace-separated integers.")
                .short('i')
                .long("input")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
            )
            .arg(clap::Arg::new("output-prefix")
                .help("Prefix for the output filename. Writes to file [prefix].colors.")
                .short('o')
                .long("output-prefix")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
            )
            .arg(clap::Arg::new("temp-dir")
                .help("Directory for the intermediate unitig file created during construction.")
                .long("temp-dir")
                .default_value(".")
                .value_parser(clap::value_parser!(PathBuf))
            )
            .arg(clap::Arg::new("k")
                .help("k-mer length of the dictionary (at most 32)")
                .short('k')
                .default_value("31")
                .value_parser(clap::value_parser!(usize))
            )
            .arg(clap::Arg::new("num-colors")
                .help("Number of colors. By default one more than the largest color in the input.")
                .long("num-colors")
                .value_parser(clap::value_parser!(u32))
            )
            .arg(clap::Arg::new("filenames")
                .help("Text file with the reference name of each color, one per line.")
                .long("filenames")
                .value_parser(clap::value_parser!(PathBuf))
            )
            .arg(clap::Arg::new("encoding")
                .help("Color set encoding: gaps or hybrid")
                .long("encoding")
                .short('e')
                .default_value("gaps")
                .value_parser(|s: &str| s.parse::<ColorSetEncoding>())
            )
            .arg(clap::Arg::new("buffer-bytes")
                .help("Capacity of one staging buffer in bytes. By default min(10000 * 4 * number of colors, 1 GiB).")
                .long("buffer-bytes")
                .value_parser(clap::value_parser!(usize))
            )
            .arg(clap::Arg::new("forward-only")
                .help("Do not treat a k-mer and its reverse complement as the same k-mer in the dictionary.")
                .long("forward-only")
                .action(clap::ArgAction::SetTrue)
            )
            .arg(clap::Arg::new("check")
                .help("Verify the index against the input after building it.")
                .long("check")
                .action(clap::ArgAction::SetTrue)
            )
            .arg(clap::Arg::new("stats-json")
                .help("Print build statistics to stdout as JSON.")
                .long("stats-json")
                .action(clap::ArgAction::SetTrue)
            )
        )
        .subcommand(clap::Command::new("inspect")
            .about("Print summary information about a color-set index")
            .arg_required_else_help(true)
            .arg(clap::Arg::new("input")
                .help("Index file written by the build command")
                .short('i')
                .long("input")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
            )
            .arg(clap::Arg::new("unitig")
                .help("Also print the colors of this unitig")
                .long("unitig")
                .short('u')
                .value_parser(clap::value_parser!(usize))
            )
        )
        ;

    let matches = cli.get_matches();

    // Initialize logging
    let mut builder = env_logger::builder();
    if matches.get_flag("verbose") {
        builder.filter_level(log::LevelFilter::Debug);
    } else {
        builder.filter_level(log::LevelFilter::Info);
    };

    // Renaming DEBUG level to INFO. We're using the DEBUG level as
    // a more verbose INFO level.
    builder.format(|buf, record| {

        let style = match record.level() {
            log::Level::Debug => buf.default_level_style(log::Level::Info), // Use INFO level styling for DEBUG messages
            _ => buf.default_level_style(record.level()),
        };

        let level_string = match record.level() {
            log::Level::Debug => style.value("INFO"),
            _ => style.value(record.level().as_str()),
        };

        let module = match record.module_path() {
            None => "unknown",
            Some(x) => x,
        };

        let time = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");

        writeln!(buf, "[{}] [{}] [{}]: {}", level_string, time, module, record.args())
    });
    builder.init();

    let result = match matches.subcommand() {
        Some(("build", sub_matches)) => build_command(sub_matches),
        Some(("inspect", sub_matches)) => inspect_command(sub_matches),
        _ => unreachable!(),
    };

    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
