use minicnn::config::EngineConfig;
use minicnn::error::Result;
use minicnn::init::WeightInit;
use minicnn::layers::{FullyConnected, Input, Sigmoid, Softmax};
use minicnn::loss::{accuracy, moving_average};
use minicnn::tensor;
use minicnn::tensors::Shape;

fn main() -> Result<()> {
    let config = EngineConfig::from_json(
        r#"{
            "threads": 2,
            "seed": 2018,
            "loss": "cross_entropy",
            "optimizer": { "type": "momentum", "learning_rate": 0.1, "momentum": 0.9 }
        }"#,
    )?;
    let mut net = config.build_network(config.build_pool()?);

    // model: 2 → 8 → 2
    net.set_input_size(Shape::new(1, 2, 1, 1));
    net.add_layer(Input::new())?;
    net.add_layer(FullyConnected::new(8, false).with_init(WeightInit::Xavier))?;
    net.add_layer(Sigmoid)?;
    net.add_layer(FullyConnected::new(2, false).with_init(WeightInit::Xavier))?;
    net.add_layer(Softmax)?;

    let inputs = tensor!([[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]]);
    let labels = tensor!([[1, 0], [0, 1], [0, 1], [1, 0]]);

    let epochs = 2000;
    let mut avg_loss = 0.0;
    for epoch in 1..=epochs {
        let loss = net.train_batch(&inputs, &labels)?;
        avg_loss = moving_average(avg_loss, epoch, loss);

        if epoch % 200 == 0 {
            let acc = accuracy(net.test_batch(&inputs)?, &labels);
            println!("epoch {epoch:>4}: loss {loss:.5} (avg {avg_loss:.5}), accuracy {acc:.2}");
            net.set_learning_rate(0.1 * 0.9f32.powi(epoch as i32 / 200))?;
        }
    }

    let out = net.test_batch(&inputs)?;
    for k in 0..4 {
        println!("{:?} → {:?}", inputs.row(k), out.row(k));
    }

    let path = std::env::temp_dir().join("minicnn-xor.txt");
    net.save_model(&path)?;
    println!("saved model to {}", path.display());
    Ok(())
}
