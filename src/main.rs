use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mailroom::app::{Mailroom, Stores};
use mailroom::domain::{Attachment, AttachmentSet, TemplateFields};
use mailroom::repository::MailTemplateRepository;
use mailroom::service::{Dispatch, SendMail, TemplateMail};
use mailroom::{config::Config, migration, telemetry};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "mailroom", about = "Compose, log and deliver transactional mail")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and apply migrations
    Migrate,

    /// Inspect or seed mail templates
    #[command(subcommand)]
    Templates(TemplateCommand),

    /// Send a message with an explicit subject and body
    Send {
        #[arg(long = "to", required = true, value_delimiter = ',')]
        to: Vec<String>,

        #[arg(long)]
        subject: String,

        #[arg(long, default_value = "")]
        body: String,

        /// Local path or http(s) URL, repeatable
        #[arg(long = "attach")]
        attachments: Vec<String>,
    },

    /// Send a message rendered from a stored template
    SendTemplate {
        #[arg(value_name = "template")]
        template: String,

        /// Overrides the template's recipients
        #[arg(long = "to", value_delimiter = ',')]
        to: Vec<String>,

        /// Template field as key=value, repeatable
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,

        #[arg(long = "attach")]
        attachments: Vec<String>,

        #[arg(long = "from-email")]
        from_email: Option<String>,

        #[arg(long = "from-name")]
        from_name: Option<String>,
    },

    /// Send a fixed test message to check transport settings
    Test {
        #[arg(long = "to")]
        to: String,
    },

    /// Dispatch every skipped message again
    ResendSkipped,
}

#[derive(Subcommand)]
enum TemplateCommand {
    /// List template keys and names
    List,

    /// Show the variables a template declares
    Variables {
        #[arg(value_name = "template")]
        template: String,
    },

    /// Upsert templates from a JSON definitions file
    Seed {
        /// Defaults to MAIL_TEMPLATES_PATH
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

fn parse_field(value: &str) -> std::result::Result<(String, String), String> {
    let (key, field) = value
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", value))?;
    Ok((key.trim().to_string(), field.to_string()))
}

fn attachment_set(sources: Vec<String>) -> AttachmentSet {
    sources.into_iter().fold(AttachmentSet::new(), |set, source| {
        if source.starts_with("http://") || source.starts_with("https://") {
            set.with(Attachment::from_url(source))
        } else {
            set.with(Attachment::from_path(source))
        }
    })
}

fn report(dispatch: Dispatch) {
    match dispatch {
        Dispatch::Queued { log_id } => println!("queued (log {:?})", log_id),
        Dispatch::Disabled { log_id } => println!("mail disabled, logged only (log {:?})", log_id),
        Dispatch::Debug { log_id } => println!("debug mode, logged as sent (log {:?})", log_id),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    telemetry::init(&config.telemetry)?;

    match cli.command {
        Commands::Migrate => {
            let url = config
                .database
                .url
                .as_deref()
                .context("DATABASE_URL is required to run migrations")?;
            migration::run_migrations(url).await?;
        }
        Commands::Templates(command) => run_templates(&config, command).await?,
        command => run_pipeline(&config, command).await?,
    }

    Ok(())
}

async fn run_templates(config: &Config, command: TemplateCommand) -> Result<()> {
    let stores = Stores::connect(config).await?;

    match command {
        TemplateCommand::List => {
            for template in stores.templates.list().await? {
                let summary = template.summary();
                println!("{}\t{}", summary.id, summary.title);
            }
        }
        TemplateCommand::Variables { template } => {
            let Some(found) = stores.templates.find_by_template(&template).await? else {
                bail!("Template '{}' not found", template);
            };
            for variable in found.variables {
                println!("{}\t{}", variable.variable, variable.label);
            }
        }
        TemplateCommand::Seed { file } => {
            let path = file
                .or_else(|| config.mail.templates_path.clone())
                .context("No templates file given and MAIL_TEMPLATES_PATH is unset")?;
            let count = migration::seed_templates(stores.templates.as_ref(), &path).await?;
            println!("seeded {} templates", count);
        }
    }

    Ok(())
}

async fn run_pipeline(config: &Config, command: Commands) -> Result<()> {
    let mailroom = Mailroom::start(config).await?;

    let result = match command {
        Commands::Send {
            to,
            subject,
            body,
            attachments,
        } => mailroom
            .service
            .send(SendMail {
                to,
                subject,
                body,
                attachments: attachment_set(attachments),
            })
            .await
            .map(report),
        Commands::SendTemplate {
            template,
            to,
            fields,
            attachments,
            from_email,
            from_name,
        } => mailroom
            .service
            .send_using_template(TemplateMail {
                template,
                fields: fields.into_iter().collect::<TemplateFields>(),
                to: (!to.is_empty()).then_some(to),
                attachments: attachment_set(attachments),
                from_email,
                from_name,
            })
            .await
            .map(report),
        Commands::Test { to } => mailroom
            .service
            .send(SendMail {
                to: vec![to],
                subject: "Mailroom test message".to_string(),
                body: "<p>This is a test message sent by mailroom.</p>".to_string(),
                attachments: AttachmentSet::new(),
            })
            .await
            .map(report),
        Commands::ResendSkipped => mailroom.service.resend_skipped().await.map(|dispatches| {
            info!(count = dispatches.len(), "Skipped mail resent");
            dispatches.into_iter().for_each(report);
        }),
        Commands::Migrate | Commands::Templates(_) => Ok(()),
    };

    // Deliveries already queued still run to completion
    mailroom.shutdown().await;
    result.map_err(Into::into)
}
