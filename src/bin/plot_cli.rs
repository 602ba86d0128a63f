#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    if let Err(err) = native::run() {
        eprintln!("plot_cli error: {err}");
        std::process::exit(1);
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use calc3d_engine::config::EngineConfig;
    use calc3d_engine::document::{Document, Expression};
    use calc3d_engine::plot::PlotGeometry;
    use simplelog::{ColorChoice, CombinedLogger, Config, LevelFilter, TermLogger, TerminalMode};
    use std::fs::{self, File};
    use std::io::{BufWriter, Write};
    use std::path::{Path, PathBuf};

    const USAGE: &str = r"plot_cli (calc3d-engine)

Evaluates a document (one expression per line) and prints what every
expression turned into.

USAGE:
  plot_cli <document> [options]

OPTIONS:
  --config <path>      Engine configuration (TOML)
  --resolution <n>     Override the default surface resolution
  --obj <path>         Write all grid and tube meshes to one OBJ file
  --overwrite          Overwrite an existing OBJ file
  -v, --verbose        Log pipeline decisions to stderr
  -h, --help           Show this help
";

    struct Options {
        document: PathBuf,
        config: Option<PathBuf>,
        resolution: Option<u32>,
        obj: Option<PathBuf>,
        overwrite: bool,
        verbose: bool,
    }

    pub fn run() -> Result<(), String> {
        let mut args = Args::new(std::env::args().skip(1).collect());
        let Some(options) = parse_options(&mut args)? else {
            println!("{USAGE}");
            return Ok(());
        };

        if options.verbose {
            CombinedLogger::init(vec![TermLogger::new(
                LevelFilter::Debug,
                Config::default(),
                TerminalMode::Mixed,
                ColorChoice::Auto,
            )])
            .map_err(|e| format!("init logger: {e}"))?;
        }

        let mut config = match &options.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .map_err(|e| format!("read {}: {e}", path.display()))?;
                EngineConfig::from_toml_str(&text).map_err(|e| e.to_string())?
            }
            None => EngineConfig::default(),
        };
        if let Some(resolution) = options.resolution {
            config.surface_resolution = Some(resolution);
            config.validate().map_err(|e| e.to_string())?;
        }

        let text = fs::read_to_string(&options.document)
            .map_err(|e| format!("read {}: {e}", options.document.display()))?;

        let mut document = Document::new(&config);
        for line in text.lines() {
            document.add(line);
        }
        let report = document.evaluate();

        for expr in document.expressions() {
            println!("{}", describe(expr));
        }
        println!("{report}");

        if let Some(path) = &options.obj {
            let written = write_obj_file(path, &document, options.overwrite)?;
            println!("wrote {written} object(s) to {}", path.display());
        }
        Ok(())
    }

    fn parse_options(args: &mut Args) -> Result<Option<Options>, String> {
        let mut document = None;
        let mut config = None;
        let mut resolution = None;
        let mut obj = None;
        let mut overwrite = false;
        let mut verbose = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => config = Some(PathBuf::from(args.value("--config")?)),
                "--resolution" => {
                    let value = args.value("--resolution")?;
                    let parsed = value
                        .parse::<u32>()
                        .map_err(|e| format!("invalid --resolution `{value}`: {e}"))?;
                    resolution = Some(parsed);
                }
                "--obj" => obj = Some(PathBuf::from(args.value("--obj")?)),
                "--overwrite" => overwrite = true,
                "-v" | "--verbose" => verbose = true,
                "-h" | "--help" => return Ok(None),
                other if other.starts_with('-') => {
                    return Err(format!("unknown option `{other}`\n\n{USAGE}"));
                }
                other => {
                    if document.is_some() {
                        return Err(format!("unexpected argument `{other}`"));
                    }
                    document = Some(PathBuf::from(other));
                }
            }
        }

        let Some(document) = document else {
            return Ok(None);
        };
        Ok(Some(Options {
            document,
            config,
            resolution,
            obj,
            overwrite,
            verbose,
        }))
    }

    fn describe(expr: &Expression) -> String {
        let mut line = format!(
            "{:>3} {:<18} {:<9} {}",
            expr.order(),
            expr.kind().to_string(),
            format!("{:?}", expr.status()),
            expr.content().trim()
        );
        if let Some(slider) = expr.slider() {
            line.push_str(&format!(
                "  = {:.4} [{}, {}]",
                slider.value, slider.min, slider.max
            ));
        }
        if let Some(values) = expr.output() {
            line.push_str(&format!("  = {values:?}"));
        }
        if let Some(cached) = expr.geometry() {
            line.push_str(&format!(
                "  {} vertices, {} primitives ({})",
                cached.geometry.vertex_count(),
                cached.geometry.primitive_count(),
                cached.diagnostics
            ));
        }
        if let Some(err) = expr.error() {
            line.push_str(&format!("  error: {err}"));
        }
        line
    }

    fn write_obj_file(path: &Path, document: &Document, overwrite: bool) -> Result<usize, String> {
        if path.exists() && !overwrite {
            return Err(format!(
                "refusing to overwrite existing file {} (use --overwrite)",
                path.display()
            ));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| format!("create dir {}: {e}", parent.display()))?;
        }

        let file = File::create(path).map_err(|e| format!("create {}: {e}", path.display()))?;
        let mut w = BufWriter::new(file);
        let io = |e: std::io::Error| format!("write obj: {e}");

        writeln!(w, "# calc3d-engine plot_cli").map_err(io)?;

        let mut offset = 1u32;
        let mut written = 0;
        for expr in document.expressions() {
            let Some(cached) = expr.geometry() else {
                continue;
            };
            let (positions, normals, indices) = match &cached.geometry {
                PlotGeometry::Grid(mesh) => (
                    mesh.positions.as_slice(),
                    mesh.normals.as_slice(),
                    mesh.topology.indices.as_slice(),
                ),
                PlotGeometry::Tube(tube) => (
                    tube.positions.as_slice(),
                    tube.normals.as_slice(),
                    tube.topology.indices.as_slice(),
                ),
                PlotGeometry::Arrows(_) | PlotGeometry::Point(_) => continue,
            };

            writeln!(w, "o expr_{}", expr.id().0).map_err(io)?;
            for p in positions {
                writeln!(w, "v {} {} {}", p[0], p[1], p[2]).map_err(io)?;
            }
            for n in normals {
                writeln!(w, "vn {} {} {}", n[0], n[1], n[2]).map_err(io)?;
            }
            for tri in indices.chunks_exact(3) {
                let a = tri[0] + offset;
                let b = tri[1] + offset;
                let c = tri[2] + offset;
                writeln!(w, "f {a}//{a} {b}//{b} {c}//{c}").map_err(io)?;
            }

            let count = u32::try_from(positions.len()).map_err(|e| format!("mesh too large: {e}"))?;
            offset += count;
            written += 1;
        }

        w.flush().map_err(io)?;
        Ok(written)
    }

    struct Args {
        args: Vec<String>,
        pos: usize,
    }

    impl Args {
        fn new(args: Vec<String>) -> Self {
            Self { args, pos: 0 }
        }

        fn next(&mut self) -> Option<String> {
            let arg = self.args.get(self.pos)?.clone();
            self.pos += 1;
            Some(arg)
        }

        fn value(&mut self, flag: &str) -> Result<String, String> {
            self.next()
                .ok_or_else(|| format!("missing value for {flag}"))
        }
    }
}
