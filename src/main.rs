use anyhow::Result;
use clap::{Parser, Subcommand};
use fit_insights::config;
use fit_insights::db;
use fit_insights::importer::DataImporter;
use fit_insights::model::OutputFormat;
use fit_insights::registry;
use fit_insights::render::TemplateRenderer;
use fit_insights::summary;
use fit_insights::users::{self, ListOptions, UserFields};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about = "Automated health & workout insight CMS")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import the dataset CSV into SQLite
    Import {
        /// CSV path; defaults to `import.default_csv` from the config
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Keep previously imported rows instead of replacing them
        #[arg(long)]
        keep_existing: bool,
    },
    /// List stored templates
    Templates,
    /// Render a template report to stdout
    Render {
        template_id: i64,
        /// Output format: text, markdown or html
        #[arg(long, default_value = "text")]
        format: String,
        /// Restrict placeholder queries to one user where possible
        #[arg(long)]
        user: Option<i64>,
    },
    /// Reseed the built-in templates and placeholder queries
    Seed,
    /// Print the SQL analytical summary
    Summary,
    /// Manage users
    #[command(subcommand)]
    User(UserCommand),
}

#[derive(Debug, Subcommand)]
enum UserCommand {
    /// Create a user
    Add(UserArgs),
    /// Show one user with aggregate statistics
    Show { user_id: i64 },
    /// List users
    List {
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long, default_value_t = 0)]
        offset: i64,
        /// Substring match against gender
        #[arg(long)]
        search: Option<String>,
        /// Newest user id first
        #[arg(long)]
        desc: bool,
    },
    /// Update a user's fields
    Update {
        user_id: i64,
        #[command(flatten)]
        fields: UserArgs,
    },
    /// Delete a user
    Rm {
        user_id: i64,
        /// Also delete the user's workout, nutrition, and analysis rows
        #[arg(long)]
        cascade: bool,
    },
}

#[derive(Debug, clap::Args)]
struct UserArgs {
    #[arg(long)]
    age: Option<f64>,
    #[arg(long)]
    gender: Option<String>,
    #[arg(long)]
    weight: Option<f64>,
    #[arg(long)]
    height: Option<f64>,
    #[arg(long)]
    bmi: Option<f64>,
    #[arg(long)]
    fat_percentage: Option<f64>,
    #[arg(long)]
    lean_mass_kg: Option<f64>,
    #[arg(long)]
    workout_frequency: Option<f64>,
    #[arg(long)]
    water_intake: Option<f64>,
    #[arg(long)]
    resting_bpm: Option<f64>,
}

impl From<UserArgs> for UserFields {
    fn from(args: UserArgs) -> Self {
        UserFields {
            age: args.age,
            gender: args.gender,
            weight: args.weight,
            height: args.height,
            bmi: args.bmi,
            fat_percentage: args.fat_percentage,
            lean_mass_kg: args.lean_mass_kg,
            workout_frequency: args.workout_frequency,
            water_intake: args.water_intake,
            resting_bpm: args.resting_bpm,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load_or_default(&args.config)?;
    cfg.ensure_dirs()?;

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.resolved_database_url());
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;
    registry::seed_templates_if_empty(&pool).await?;
    registry::seed_queries_if_empty(&pool).await?;

    match args.command {
        Command::Import { csv, keep_existing } => {
            let path = csv.unwrap_or_else(|| PathBuf::from(&cfg.import.default_csv));
            let importer = DataImporter::new(pool.clone());
            let rows = importer.import_csv(&path, !keep_existing).await?;
            println!("Imported {} rows from {}.", rows, path.display());
        }
        Command::Templates => {
            let templates = registry::list_templates(&pool).await?;
            if templates.is_empty() {
                println!("No templates found.");
            }
            for tpl in templates {
                println!("[{}] {}", tpl.template_id, tpl.template_name);
            }
        }
        Command::Render {
            template_id,
            format,
            user,
        } => {
            let renderer = TemplateRenderer::new(pool.clone()).await?;
            let report = renderer
                .render(template_id, OutputFormat::parse(&format), user)
                .await?;
            println!("{report}");
        }
        Command::Seed => {
            registry::seed_templates(&pool).await?;
            registry::seed_queries(&pool).await?;
            info!("templates and queries reseeded");
            println!("Templates and queries reseeded.");
        }
        Command::Summary => print_summary(&pool).await?,
        Command::User(cmd) => run_user_command(&pool, cmd).await?,
    }

    Ok(())
}

async fn print_summary(pool: &db::Pool) -> Result<()> {
    println!("--- SQL Analytical Summary ---");

    println!("\nAverage calories burned by workout type:");
    for row in summary::calories_by_workout_type(pool).await? {
        println!(
            "- {}: {} kcal (duration {} hrs across {} sessions)",
            row.workout_type.unwrap_or_default(),
            fmt_opt(row.avg_calories),
            fmt_opt(row.avg_duration),
            row.sessions
        );
    }

    println!("\nTop caloric deficit users:");
    for row in summary::top_caloric_deficit(pool).await? {
        println!(
            "- User {} ({}, {}y): cal_balance {} with {} hrs training",
            row.user_id,
            row.gender.unwrap_or_default(),
            fmt_opt(row.age),
            fmt_opt(row.cal_balance),
            fmt_opt(row.session_duration)
        );
    }

    if let Some(m) = summary::macro_averages(pool).await? {
        println!(
            "\nMacro intake overview (averages): carbs {} g, protein {} g, fats {} g, calories {} kcal",
            fmt_opt(m.carbs),
            fmt_opt(m.proteins),
            fmt_opt(m.fats),
            fmt_opt(m.calories)
        );
    }

    println!("\nTraining efficiency by workout type:");
    for row in summary::efficiency_by_workout_type(pool).await? {
        println!(
            "- {}: efficiency {}, focus {}, recovery {}",
            row.workout_type.unwrap_or_default(),
            fmt_opt(row.avg_efficiency),
            fmt_opt(row.avg_focus),
            fmt_opt(row.avg_recovery)
        );
    }

    Ok(())
}

async fn run_user_command(pool: &db::Pool, cmd: UserCommand) -> Result<()> {
    match cmd {
        UserCommand::Add(args) => {
            let user_id = users::create_user(pool, args.into()).await?;
            println!("Created user {user_id}.");
        }
        UserCommand::Show { user_id } => match users::user_statistics(pool, user_id).await? {
            Some(stats) => print!("{}", serde_yaml::to_string(&stats)?),
            None => anyhow::bail!("user {user_id} not found"),
        },
        UserCommand::List {
            limit,
            offset,
            search,
            desc,
        } => {
            let opts = ListOptions {
                limit,
                offset,
                search,
                order_desc: desc,
            };
            for user in users::list_users(pool, &opts).await? {
                println!(
                    "[{}] {} age {} weight {} bmi {}",
                    user.user_id,
                    user.gender.unwrap_or_default(),
                    fmt_opt(user.age),
                    fmt_opt(user.weight),
                    fmt_opt(user.bmi)
                );
            }
            println!("{} users total.", users::count_users(pool).await?);
        }
        UserCommand::Update { user_id, fields } => {
            if users::update_user(pool, user_id, fields.into()).await? {
                println!("Updated user {user_id}.");
            } else {
                anyhow::bail!("user {user_id} not found or no fields given");
            }
        }
        UserCommand::Rm { user_id, cascade } => {
            if users::delete_user(pool, user_id, cascade).await? {
                println!("Deleted user {user_id}.");
            } else {
                anyhow::bail!("user {user_id} not found");
            }
        }
    }
    Ok(())
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}
