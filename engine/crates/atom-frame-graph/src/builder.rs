use crate::producer::ScopeProducer;

/// 当前帧额外参与调度的 scope producer
///
/// 只借用 producer 一帧，排在已注册的 producer 之后
#[derive(Default)]
pub struct FrameGraphBuilder<'a> {
    producers: Vec<&'a mut dyn ScopeProducer>,
}

impl<'a> FrameGraphBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn import_scope_producer(&mut self, producer: &'a mut dyn ScopeProducer) -> &mut Self {
        self.producers.push(producer);
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.producers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    pub(crate) fn into_producers(self) -> Vec<&'a mut dyn ScopeProducer> {
        self.producers
    }
}
