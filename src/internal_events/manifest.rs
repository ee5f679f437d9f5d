use metrics::counter;

use super::InternalEvent;

#[derive(Debug)]
pub struct OverrideApplied<'a> {
    pub field: &'a str,
    pub replaced: usize,
}

impl InternalEvent for OverrideApplied<'_> {
    fn emit(self) {
        debug!(
            message = "Engine override applied.",
            field = %self.field,
            replaced = %self.replaced,
        );
        counter!("engine_overrides_total", "result" => "replaced").increment(1);
    }
}

#[derive(Debug)]
pub struct OverrideAlreadyApplied<'a> {
    pub field: &'a str,
}

impl InternalEvent for OverrideAlreadyApplied<'_> {
    fn emit(self) {
        debug!(
            message = "Engine override already present, skipping.",
            field = %self.field,
        );
        counter!("engine_overrides_total", "result" => "already_applied").increment(1);
    }
}

#[derive(Debug)]
pub struct OverrideMissing<'a> {
    pub field: &'a str,
    pub old: &'a str,
    pub strict: bool,
}

impl InternalEvent for OverrideMissing<'_> {
    fn emit(self) {
        if self.strict {
            error!(
                message = "Engine template has no value to override.",
                field = %self.field,
                expected = %self.old,
            );
        } else {
            warn!(
                message = "Engine template has no value to override, submitting it unchanged.",
                field = %self.field,
                expected = %self.old,
            );
        }
        counter!("engine_overrides_total", "result" => "missing").increment(1);
    }
}
