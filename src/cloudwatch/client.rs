//! CloudWatch `GetMetricData` client
//!
//! One query per registered metric, newest samples first, pages followed
//! through the SDK paginator.

use crate::relay::config::SourceConfig;
use crate::relay::error::FetchError;
use crate::relay::source::MetricSource;
use crate::relay::types::{MetricResult, MetricSpec, Sample};
use crate::relay::window::FetchWindow;
use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_cloudwatch::config::Region;
use aws_sdk_cloudwatch::error::{DisplayErrorContext, SdkError};
use aws_sdk_cloudwatch::operation::get_metric_data::GetMetricDataError;
use aws_sdk_cloudwatch::primitives::DateTime;
use aws_sdk_cloudwatch::types::{
    Dimension, Metric, MetricDataQuery, MetricDataResult, MetricStat, ScanBy, StatusCode,
};
use aws_sdk_cloudwatch::Client;
use std::collections::HashMap;

const MAX_PAGES: usize = 100;

#[derive(Debug, Clone)]
pub struct CloudWatchClient {
    client: Client,
    period: i32,
    stat: String,
}

impl CloudWatchClient {
    /// Load shared AWS config (default credential chain) for the configured region
    pub async fn from_env(config: &SourceConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(config.timeout)
                    .build(),
            );
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }

        let sdk_config = loader.load().await;
        Self::new(Client::new(&sdk_config), config)
    }

    pub fn new(client: Client, config: &SourceConfig) -> Self {
        Self {
            client,
            period: i32::try_from(config.period).unwrap_or(i32::MAX),
            stat: config.stat.clone(),
        }
    }
}

/// One `MetricDataQuery` per spec, in registration order
fn build_queries(
    specs: &[MetricSpec],
    period: i32,
    stat: &str,
) -> Result<Vec<MetricDataQuery>, FetchError> {
    specs
        .iter()
        .map(|spec| {
            let mut metric = Metric::builder()
                .namespace(&spec.namespace)
                .metric_name(&spec.name);
            if let Some(dimension) = &spec.dimension {
                metric = metric.dimensions(
                    Dimension::builder()
                        .name(&dimension.name)
                        .value(&dimension.value)
                        .build(),
                );
            }

            let metric_stat = MetricStat::builder()
                .metric(metric.build())
                .period(period)
                .stat(stat)
                .build();

            Ok(MetricDataQuery::builder()
                .id(&spec.id)
                .metric_stat(metric_stat)
                .return_data(true)
                .build())
        })
        .collect()
}

fn to_metric_result(data: &MetricDataResult) -> Option<MetricResult> {
    let id = data.id()?;

    if let Some(code) = data.status_code() {
        if *code != StatusCode::Complete {
            log::debug!("GetMetricData status for {}: {}", id, code.as_str());
        }
    }

    let samples = data
        .timestamps()
        .iter()
        .zip(data.values())
        .map(|(ts, value)| Sample {
            timestamp: ts.secs(),
            value: *value,
        })
        .collect();
    Some(MetricResult::new(id, samples))
}

/// Fold a page into the accumulated results, merging pages for the same id
fn merge_page(
    results: &mut Vec<MetricResult>,
    index: &mut HashMap<String, usize>,
    page: &[MetricDataResult],
) {
    for result in page.iter().filter_map(to_metric_result) {
        match index.get(&result.id) {
            Some(&i) => results[i].samples.extend(result.samples),
            None => {
                index.insert(result.id.clone(), results.len());
                results.push(result);
            }
        }
    }
}

fn fetch_error(err: SdkError<GetMetricDataError>) -> FetchError {
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ServiceError(_) => FetchError::Status {
            code: err.raw_response().map(|r| r.status().as_u16()).unwrap_or_default(),
            body: message,
        },
        SdkError::ResponseError(_) => FetchError::Decode(message),
        _ => FetchError::Transport(message),
    }
}

#[async_trait]
impl MetricSource for CloudWatchClient {
    async fn fetch(
        &self,
        window: &FetchWindow,
        specs: &[MetricSpec],
    ) -> Result<Vec<MetricResult>, FetchError> {
        let queries = build_queries(specs, self.period, &self.stat)?;

        let mut pages = self
            .client
            .get_metric_data()
            .set_metric_data_queries(Some(queries))
            .start_time(DateTime::from_secs(window.start.timestamp()))
            .end_time(DateTime::from_secs(window.end.timestamp()))
            .scan_by(ScanBy::TimestampDescending)
            .into_paginator()
            .send();

        let mut results = Vec::with_capacity(specs.len());
        let mut index = HashMap::new();
        let mut fetched = 0;

        while let Some(page) = pages.next().await {
            let page = page.map_err(fetch_error)?;
            merge_page(&mut results, &mut index, page.metric_data_results());

            fetched += 1;
            if fetched == MAX_PAGES {
                log::warn!(
                    "⚠️  GetMetricData still paginating after {} pages, using partial results",
                    MAX_PAGES
                );
                break;
            }
        }

        Ok(results)
    }
}
