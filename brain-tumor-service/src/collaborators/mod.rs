pub mod answer;
pub mod classifier;
pub mod decoder;
pub mod knowledge;
pub mod narrative;
pub mod report;
pub mod segmentation;
pub mod utils;

pub use answer::{Answer, AnswerGenerator, GenerationError, LlmAnswerGenerator, TokenBudget};
pub use classifier::{
    ClassifierError, ImageClassifier, ImageTensor, ModelServerClassifier, Prediction, TumorLabel,
};
pub use decoder::{DecodeError, DocumentDecoder, PdfDecoder};
pub use knowledge::{
    ChatModel, Chatbot, KnowledgeBase, KnowledgeError, OpenRouterChatModel, PineconeKnowledgeBase,
};
pub use narrative::{LlmNarrativeGenerator, Narrative, NarrativeGenerator, NarrativeMessage};
pub use report::{PdfReportRenderer, ReportRenderer};
pub use segmentation::{HuggingFaceSegmenter, SegmentationService};
pub use utils::ChatCompletionsClient;
