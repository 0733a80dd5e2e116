use async_trait::async_trait;
use tracing::{Instrument, debug, debug_span};

use crate::application::{Chain, Interceptor};
use crate::domain::entities::ImageResult;

/// First stage: reports chain start and end to the request's listener.
pub(crate) struct EventTrackingInterceptor;

#[async_trait]
impl Interceptor for EventTrackingInterceptor {
    async fn intercept(&self, chain: Chain) -> ImageResult {
        let request = chain.request().clone();
        let listener = chain.listener().clone();
        let span = debug_span!("image_request", data = %request.data(), size = %chain.size());

        async move {
            listener.chain_start(&request);
            let result = chain.proceed(request.clone()).await;
            debug!(success = result.is_success(), "Interceptor chain finished");
            listener.chain_end(&request, &result);
            result
        }
        .instrument(span)
        .await
    }
}
