mod parse;

use crate::parse::{Args, AuthArgs, Command, PositionArgs, ProviderKind, ReportArgs};
use chrono::{SecondsFormat, Utc};
use clap::Parser;
use env_logger::Env;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use quakewatch::export::{print_summary, save_to_csv};
use quakewatch::location::{GEOLOCATION_TIMEOUT, locate_record};
use quakewatch::report::{AdditionalAnswers, questions};
use quakewatch::util::print_hms;
use quakewatch::{
    ClientConfig, Endpoints, FileStore, FixedPosition, Geolocation, GeolocationError,
    HttpTransport, LiveQueryProvider, LocalCache, Prefetch, QuakeData, QuakeProvider, QuakeRecord,
    QuakeReport, ReportingClient, ReportingCredentials, ReqwestTransport, Scope,
    SeismicPortalProvider, StaticFilesProvider,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn endpoints(args: &Args) -> Endpoints {
    let mut endpoints = Endpoints::default();
    if let Some(url) = &args.query_api {
        endpoints = endpoints.with_query_api(url.as_str());
    }
    if let Some(url) = &args.static_files {
        endpoints = endpoints.with_static_files(url.as_str());
    }
    if let Some(url) = &args.seismic_portal {
        endpoints = endpoints.with_seismic_portal(url.as_str());
    }
    if let Some(url) = &args.geoweb {
        endpoints = endpoints.with_geoweb(url.as_str());
    }
    endpoints
}

pub fn build_provider(
    kind: ProviderKind,
    endpoints: Endpoints,
    transport: Arc<dyn HttpTransport>,
) -> Box<dyn QuakeProvider> {
    match kind {
        ProviderKind::Static => Box::new(StaticFilesProvider::new(endpoints, transport)),
        ProviderKind::Live => Box::new(LiveQueryProvider::new(endpoints, transport)),
        ProviderKind::Portal => Box::new(SeismicPortalProvider::new(endpoints, transport)),
    }
}

/// One line per event for list output.
pub fn format_record(record: &QuakeRecord) -> String {
    let mut line = format!(
        "{:<12} {} M{:.1} {:<8} {}",
        record.id, record.time, record.magnitude, record.severity, record.place
    );
    if !record.distance.is_empty() {
        line.push_str(&format!(" ({})", record.distance));
    }
    line
}

async fn label_distances(records: &mut [QuakeRecord], position: Option<&FixedPosition>) {
    for record in records.iter_mut() {
        // Portal records carry no distance label.
        if record.distance.is_empty() {
            continue;
        }
        match position {
            Some(position) => locate_record(position, record).await,
            None => record.resolve_distance(Err(&GeolocationError::Unavailable(
                "no position given".to_string(),
            ))),
        }
    }
}

fn local_cache(
    args: &Args,
    transport: Arc<dyn HttpTransport>,
    auth: &AuthArgs,
) -> Result<(LocalCache, ReportingClient), Box<dyn std::error::Error>> {
    let reporting = ReportingClient::new(
        transport,
        endpoints(args),
        ReportingCredentials::new(auth.auth_user.as_str(), auth.auth_password.as_str()),
    );
    let store = FileStore::open(&args.store)?;
    Ok((LocalCache::new(Box::new(store), reporting.clone()), reporting))
}

async fn list(
    data: &QuakeData,
    scope: Scope,
    all: bool,
    pages: u32,
    output: Option<&str>,
    position: &PositionArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();

    if all {
        let refreshed = join_all(Scope::ALL.iter().map(|&scope| data.reload(scope))).await;
        for (scope, records) in Scope::ALL.iter().zip(&refreshed) {
            info!("{} scope holds {} events", scope, records.len());
        }
    }

    let mut records = data.list_scope(scope, Prefetch::None);
    if records.is_empty() {
        records = data.reload(scope).await;
    }

    if pages > 0 {
        let progress_bar = ProgressBar::new(u64::from(pages));
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>4}/{len:4} pages {msg}")?
                .progress_chars("##-"),
        );
        for _ in 0..pages {
            let fresh = data.paginate(scope).await;
            progress_bar.inc(1);
            if fresh.is_empty() {
                break;
            }
            records.extend(fresh);
        }
        progress_bar.finish_with_message(format!("{} events", records.len()));
    }

    label_distances(&mut records, position.fixed().as_ref()).await;
    for record in &records {
        println!("{}", format_record(record));
    }

    print_hms(&start);
    if let Some(filename) = output {
        save_to_csv(&records, filename)?;
    }
    print_summary(&records);
    Ok(())
}

async fn show(
    data: &QuakeData,
    id: &str,
    position: &PositionArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut record = data.find_by_id(id);
    if record.is_none() {
        join_all(Scope::ALL.iter().map(|&scope| data.reload(scope))).await;
        record = data.find_by_id(id);
    }
    let Some(mut record) = record else {
        println!("No event with id {}", id);
        return Ok(());
    };

    label_distances(std::slice::from_mut(&mut record), position.fixed().as_ref()).await;
    println!("{} [{}]", record.place, record.severity.header_class());
    println!("Magnitude: {:.1}", record.magnitude);
    println!("Time: {} ({} {} {})", record.time, record.local_date, record.local_time, record.timezone);
    println!("Position: {:.2}, {:.2}", record.latitude, record.longitude);
    if let Some(depth) = record.depth {
        println!("Depth: {} km", depth);
    }
    if !record.distance.is_empty() {
        println!("Distance: {}", record.distance);
    }
    Ok(())
}

async fn report(
    cache: Arc<LocalCache>,
    reporting: ReportingClient,
    args: &ReportArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    if cache.is_initial_run() {
        info!("First report from this device");
        cache.set_initial_run(false)?;
    }
    if let Err(err) = cache.ensure_api_key().await {
        warn!("Could not obtain a device API key: {}", err);
    }

    let report = QuakeReport::new(reporting, Arc::clone(&cache));
    report.set_reference_id(args.reference.clone());

    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    match args.position.fixed() {
        Some(position) => {
            if cache.first_time_gps_popup() {
                println!("Using the supplied position for this report");
            }
            match position.current_position(GEOLOCATION_TIMEOUT, false).await {
                Ok(fix) => report.apply_position_fix(&fix),
                Err(err) => {
                    warn!("No position fix: {}", err);
                    report.set_felt_at(&now);
                }
            }
        }
        None => report.set_felt_at(&now),
    }

    if let Some(postal_code) = &args.postal_code {
        report.set_postal_code(postal_code.as_str());
    }
    report.set_place(&args.place, &args.street);
    report.set_street(args.street.as_str());
    report.set_floor(args.floor.as_str());
    if let Some(class) = args.class {
        report.set_severity_class(class);
    }
    report.set_comment(args.comment.clone());
    report.set_contact(args.contact.clone());
    if args.items_dropped {
        report.set_additional_answers(
            AdditionalAnswers::new().with_flag(questions::ITEMS_DROPPED, true),
        );
    }

    let outcome = report.submit().await?;
    if outcome.delivered {
        println!("Report delivered");
    } else if args.cache_on_failure {
        cache.cache_report(&outcome.payload)?;
        println!("Report not delivered; cached for `resend`");
    } else {
        println!("Report not delivered");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::try_parse()?;
    // Initialize logger
    env_logger::Builder::from_env(
        Env::default().default_filter_or(if args.verbose { "debug" } else { "info" }),
    )
    .init();

    let config = ClientConfig::default().with_timeout(Duration::from_secs(args.timeout));
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(config)?);

    match &args.command {
        Command::List {
            scope,
            all,
            pages,
            output,
            position,
        } => {
            let data = QuakeData::new(build_provider(args.provider, endpoints(&args), transport));
            if !data.start().await {
                warn!("Feeds unreachable, continuing offline");
            }
            list(&data, *scope, *all, *pages, output.as_deref(), position).await?;
        }
        Command::Show { id, position } => {
            let data = QuakeData::new(build_provider(args.provider, endpoints(&args), transport));
            data.start().await;
            show(&data, id, position).await?;
        }
        Command::Report { report: report_args, auth } => {
            let (cache, reporting) = local_cache(&args, transport, auth)?;
            report(Arc::new(cache), reporting, report_args).await?;
        }
        Command::ApiKey { auth } => {
            let (cache, _) = local_cache(&args, transport, auth)?;
            let key = cache.generate_api_key().await?;
            println!("Device API key: {}", key);
        }
        Command::Resend { auth } => {
            let (cache, _) = local_cache(&args, transport, auth)?;
            cache.report_cached().await?;
            cache.remove_cached_report()?;
            println!("Cached report delivered");
        }
    }

    Ok(())
}
