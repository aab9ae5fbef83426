use deploy_lambda::adapters::aws::AwsControlPlane;
use deploy_lambda::config::ReconcilerConfig;
use deploy_lambda::handlers::deploy::{serve_deploy_event, ApiGatewayResponse};
use deploy_lambda::telemetry;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

async fn handle_request(event: LambdaEvent<Value>) -> Result<ApiGatewayResponse, Error> {
    let config = ReconcilerConfig::from_env().map_err(|error| Error::from(error.to_string()))?;
    let plane = AwsControlPlane::load().await;

    Ok(serve_deploy_event(event.payload, None, &plane, &config).await)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = ReconcilerConfig::from_env().map_err(|error| Error::from(error.to_string()))?;
    telemetry::init(config.log_format).map_err(|error| Error::from(error.to_string()))?;

    lambda_runtime::run(service_fn(handle_request)).await
}
