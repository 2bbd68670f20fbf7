use crate::engine::PredictionService;

#[derive(Clone)]
pub struct AppState {
    pub predictor: PredictionService,
}

impl AppState {
    pub fn new(predictor: PredictionService) -> Self {
        Self { predictor }
    }
}
